//! Error types for block storage operations.

use driftlog_types::EntryHash;

/// Errors that can occur during block storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(EntryHash),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes no longer match their content address.
    #[error("block corruption detected: expected {expected}, got {actual}")]
    CorruptBlock {
        /// The address the block was requested under.
        expected: EntryHash,
        /// The digest of the bytes actually on disk.
        actual: EntryHash,
    },
}
