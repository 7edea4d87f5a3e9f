//! Core trait for content-addressed block storage.

use bytes::Bytes;
use driftlog_types::EntryHash;

use crate::error::StoreError;

/// Trait for storing and retrieving content-addressed blocks.
///
/// A block is an opaque byte blob; its address is the BLAKE3 digest of its
/// contents, assigned by the store on `put`. All implementations must be
/// `Send + Sync` for use across async tasks. Data is passed as [`Bytes`] to
/// enable zero-copy handoff between the log and its storage.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist a blob and return its content address.
    async fn put(&self, data: Bytes) -> Result<EntryHash, StoreError>;

    /// Retrieve a blob by content address. Returns `None` if not found.
    async fn get(&self, hash: &EntryHash) -> Result<Option<Bytes>, StoreError>;

    /// Check whether a blob exists.
    async fn contains(&self, hash: &EntryHash) -> Result<bool, StoreError>;
}
