use crate::core::cache::{KeyValueCollection, WriteOp};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection. Batches are atomic because they run under one lock.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let map = self.inner.lock().await;
        let value = map.get(key).cloned();
        if value.is_some() {
            debug!("Memory HIT for key: {}", String::from_utf8_lossy(key));
        } else {
            debug!("Memory MISS for key: {}", String::from_utf8_lossy(key));
        }
        value
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.inner.lock().await;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut map = self.inner.lock().await;
        debug!("Memory BATCH of {} ops", ops.len());
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    map.insert(key, value);
                }
                WriteOp::Remove { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.lock().await.clear();
        debug!("Memory CLEAR");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_put_remove() {
        let collection = MemoryCollection::new();
        assert!(collection.get(b"key1").await.is_none());

        collection.put(b"key1", b"123").await.unwrap();
        assert_eq!(collection.get(b"key1").await, Some(b"123".to_vec()));

        collection.remove(b"key1").await.unwrap();
        assert!(collection.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_scan_prefix_is_ordered_and_bounded() {
        let collection = MemoryCollection::new();
        collection
            .apply(vec![
                WriteOp::put("lot/b", "2"),
                WriteOp::put("lot/a", "1"),
                WriteOp::put("lots", "x"),
                WriteOp::put("history/a", "h"),
            ])
            .await
            .unwrap();

        let rows = collection.scan_prefix(b"lot/").await.unwrap();
        let keys: Vec<&[u8]> = rows.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"lot/a".as_slice(), b"lot/b".as_slice()]);
    }

    #[tokio::test]
    async fn test_batch_and_clear() {
        let collection = MemoryCollection::new();
        collection.put(b"a", b"1").await.unwrap();
        collection
            .apply(vec![WriteOp::remove("a"), WriteOp::put("b", "2")])
            .await
            .unwrap();
        assert!(collection.get(b"a").await.is_none());
        assert_eq!(collection.get(b"b").await, Some(b"2".to_vec()));

        collection.clear().await.unwrap();
        assert!(collection.get(b"b").await.is_none());
    }
}
