//! Key-value storage abstractions shared by the backup store, the ledger
//! repository and the preference store.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

impl WriteOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<Vec<u8>>) -> Self {
        WriteOp::Remove { key: key.into() }
    }
}

#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    /// Read errors are logged and reported as a miss.
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    async fn remove(&self, key: &[u8]) -> Result<()>;

    /// Entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Applies every operation or none of them.
    async fn apply(&self, ops: Vec<WriteOp>) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub trait Store: Send + Sync {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>>;

    fn remove_collection(&self, name: &str) -> bool;
}
