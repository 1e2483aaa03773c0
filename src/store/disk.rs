use crate::core::cache::{KeyValueCollection, WriteOp};
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use tracing::debug;

/// Collection backed by one fjall partition.
///
/// Batches go through the keyspace so they commit atomically, and every write is
/// persisted before returning.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }

    fn sync(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.partition.get(key) {
            Ok(Some(value)) => {
                debug!("Disk HIT for key: {}", String::from_utf8_lossy(key));
                Some(value.to_vec())
            }
            Ok(None) => {
                debug!("Disk MISS for key: {}", String::from_utf8_lossy(key));
                None
            }
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.partition.insert(key, value)?;
        self.sync()
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.partition.remove(key)?;
        self.sync()
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        for item in self.partition.prefix(prefix) {
            let (key, value) = item?;
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut batch = self.keyspace.batch();
        debug!("Disk BATCH of {} ops", ops.len());
        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.insert(&self.partition, key, value),
                WriteOp::Remove { key } => batch.remove(&self.partition, key),
            }
        }
        batch.commit()?;
        self.sync()
    }

    async fn clear(&self) -> Result<()> {
        let mut batch = self.keyspace.batch();
        for item in self.partition.keys() {
            batch.remove(&self.partition, item?);
        }
        batch.commit()?;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjall::PartitionCreateOptions;
    use tempfile::tempdir;

    fn open(path: &std::path::Path) -> DiskCollection {
        let keyspace = fjall::Config::new(path).open().unwrap();
        let partition = keyspace
            .open_partition("test", PartitionCreateOptions::default())
            .unwrap();
        DiskCollection::new(keyspace, partition)
    }

    #[tokio::test]
    async fn test_disk_get_put_remove() {
        let dir = tempdir().unwrap();
        let collection = open(dir.path());

        assert!(collection.get(b"key1").await.is_none());
        collection.put(b"key1", b"123").await.unwrap();
        assert_eq!(collection.get(b"key1").await, Some(b"123".to_vec()));
        collection.remove(b"key1").await.unwrap();
        assert!(collection.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_disk_batch_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let collection = open(dir.path());
            collection
                .apply(vec![
                    WriteOp::put("lot/1", "a"),
                    WriteOp::put("lot/2", "b"),
                    WriteOp::put("history/1", "h"),
                ])
                .await
                .unwrap();
        }

        let collection = open(dir.path());
        let lots = collection.scan_prefix(b"lot/").await.unwrap();
        assert_eq!(lots.len(), 2);
        assert_eq!(lots[0], (b"lot/1".to_vec(), b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_disk_clear() {
        let dir = tempdir().unwrap();
        let collection = open(dir.path());
        collection.put(b"a", b"1").await.unwrap();
        collection.put(b"b", b"2").await.unwrap();

        collection.clear().await.unwrap();
        assert!(collection.get(b"a").await.is_none());
        assert!(collection.scan_prefix(b"").await.unwrap().is_empty());
    }
}
