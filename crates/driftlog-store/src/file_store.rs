//! File-based block storage backend.
//!
//! Stores one file per block with a 2-level fan-out directory structure:
//! `{base_dir}/{hex[0..2]}/{hex[2..4]}/{hex}`.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use driftlog_types::EntryHash;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::traits::BlockStore;

/// File-based block store with 2-level fan-out directory layout.
///
/// Each block is stored as a file at
/// `{base_dir}/{hex(hash)[0..2]}/{hex(hash)[2..4]}/{hex(hash)}`.
///
/// Writes are atomic: data is written to a temporary file first, then
/// renamed into place. This prevents corrupted blocks from partial writes.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Compute the full file path for a block hash.
    fn block_path(&self, hash: &EntryHash) -> PathBuf {
        let hex = hash.to_string();
        self.base_dir.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }
}

#[async_trait::async_trait]
impl BlockStore for FileStore {
    async fn put(&self, data: Bytes) -> Result<EntryHash, StoreError> {
        let hash = EntryHash::from_data(&data);
        let path = self.block_path(&hash);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to a temp file in the same directory, then rename.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(%hash, path = %path.display(), size = data.len(), "stored block to file");
        Ok(hash)
    }

    async fn get(&self, hash: &EntryHash) -> Result<Option<Bytes>, StoreError> {
        let path = self.block_path(hash);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                // Verify-on-read: re-hash and compare to the requested address.
                // A corrupt block is an error, never returned to the caller.
                let actual = EntryHash::from_data(&data);
                if actual != *hash {
                    error!(expected = %hash, %actual, "block corruption detected on read");
                    return Err(StoreError::CorruptBlock {
                        expected: *hash,
                        actual,
                    });
                }
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn contains(&self, hash: &EntryHash) -> Result<bool, StoreError> {
        let path = self.block_path(hash);
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
