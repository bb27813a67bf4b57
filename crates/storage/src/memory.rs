//! In-memory `Storage` backend: an ordered map behind a `parking_lot`
//! mutex. The default everywhere this spec's own tests run, and a fine
//! production choice for a single-process sequencer that doesn't need
//! the `postgres` feature's durability.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Storage, StorageError};

#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.lock().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        Ok(self
            .inner
            .lock()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let storage = MemoryStorage::new();
        storage.put(b"process/1", b"payload").await.unwrap();
        assert_eq!(storage.get(b"process/1").await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(storage.get(b"process/2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_the_key() {
        let storage = MemoryStorage::new();
        storage.put(b"worker/a", b"x").await.unwrap();
        storage.delete(b"worker/a").await.unwrap();
        assert_eq!(storage.get(b"worker/a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_prefix_only_returns_matching_keys() {
        let storage = MemoryStorage::new();
        storage.put(b"vote/1/a", b"1").await.unwrap();
        storage.put(b"vote/1/b", b"2").await.unwrap();
        storage.put(b"vote/2/a", b"3").await.unwrap();

        let results = storage.scan_prefix(b"vote/1/").await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
