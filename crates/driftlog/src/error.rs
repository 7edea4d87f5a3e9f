//! Error types for the log crate.

use driftlog_store::StoreError;
use driftlog_types::EntryHash;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// An entry's content no longer matches its content address.
    #[error("invalid entry hash: {0}")]
    InvalidHash(EntryHash),

    /// Construction was given a malformed entry set.
    #[error("bad entries: {0}")]
    BadEntries(String),

    /// Construction was given heads that don't resolve into the entry set.
    #[error("bad heads: {0}")]
    BadHeads(String),

    /// The local signing key is not in the allowed set.
    #[error("key {0} is not allowed to write to this log")]
    NotAllowedToWrite(String),

    /// An incoming signed entry lacks a public key.
    #[error("entry {0} is missing a public key")]
    EntryMissingKey(EntryHash),

    /// An incoming signed entry lacks a signature.
    #[error("entry {0} is missing a signature")]
    EntryMissingSig(EntryHash),

    /// Cryptographic signature verification returned false.
    #[error("signature verification failed for entry {0}")]
    VerificationFailed(EntryHash),

    /// A block required for reconstruction was not present in the store.
    #[error("entry not found in store: {0}")]
    EntryNotFound(EntryHash),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Canonical serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
