//! In-memory block storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use driftlog_types::EntryHash;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::BlockStore;

/// In-memory block store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for logs that only need to live as long as the
/// process. Because blocks are keyed by their own digest, putting the same
/// bytes twice is a no-op.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<EntryHash, Bytes>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlockStore for MemoryStore {
    async fn put(&self, data: Bytes) -> Result<EntryHash, StoreError> {
        let hash = EntryHash::from_data(&data);
        let mut map = self.blocks.write().expect("lock poisoned");
        debug!(%hash, size = data.len(), "storing block in memory");
        map.insert(hash, data);
        Ok(hash)
    }

    async fn get(&self, hash: &EntryHash) -> Result<Option<Bytes>, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    async fn contains(&self, hash: &EntryHash) -> Result<bool, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        let data = Bytes::from_static(b"hello block");

        let hash = store.put(data.clone()).await.unwrap();
        let result = store.get(&hash).await.unwrap();
        assert_eq!(result, Some(data));
    }

    #[tokio::test]
    async fn test_put_returns_content_address() {
        let store = MemoryStore::new();
        let data = Bytes::from_static(b"addressed");

        let hash = store.put(data.clone()).await.unwrap();
        assert_eq!(hash, EntryHash::from_data(&data));
    }

    #[tokio::test]
    async fn test_put_same_bytes_same_hash() {
        let store = MemoryStore::new();
        let h1 = store.put(Bytes::from_static(b"dup")).await.unwrap();
        let h2 = store.put(Bytes::from_static(b"dup")).await.unwrap();
        assert_eq!(h1, h2);
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = MemoryStore::new();
        let hash = EntryHash::from_data(b"does not exist");
        assert_eq!(store.get(&hash).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_contains_true_false() {
        let store = MemoryStore::new();
        let data = Bytes::from_static(b"exists");
        let hash = EntryHash::from_data(&data);

        assert!(!store.contains(&hash).await.unwrap());
        store.put(data).await.unwrap();
        assert!(store.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_get_empty_block() {
        let store = MemoryStore::new();
        let data = Bytes::from_static(b"");
        let hash = store.put(data.clone()).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_concurrent_put_different_blocks() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..50u32 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                let data = Bytes::from(vec![i as u8; 100]);
                let hash = s.put(data.clone()).await.unwrap();
                let got = s.get(&hash).await.unwrap();
                assert_eq!(got, Some(data));
            }));
        }

        for h in handles {
            h.await.unwrap();
        }
    }
}
