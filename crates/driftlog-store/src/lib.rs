//! Content-addressed block storage and signing adapters for Driftlog.
//!
//! This crate defines the [`BlockStore`] trait for persisting canonical
//! entry bytes by their BLAKE3 digest, along with two concrete backends:
//!
//! - [`MemoryStore`] — in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileStore`] — file-based storage with a 2-level fan-out directory layout.
//!
//! It also provides the [`Keystore`] verification seam with its ed25519
//! implementation, and the [`Signer`] identity used to sign entries.

mod error;
mod file_store;
mod keystore;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use keystore::{Ed25519Keystore, Keystore, Signer};
pub use memory_store::MemoryStore;
pub use traits::BlockStore;
