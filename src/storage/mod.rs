//! Persisted key/value storage
//!
//! The cache and the optimizer's backups only need string values under
//! string keys. `MemoryStore` is shared between several cache handles to
//! model independent contexts over the same storage; `FileStore` survives
//! restarts.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::StorageResult;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key was never written or was removed
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a key; removing an absent key is not an error
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Every key currently stored, in no particular order
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Build the store selected by configuration
pub async fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::with_quota(config.max_value_bytes))),
        StorageBackend::File => {
            let store = FileStore::open(&config.path, config.max_value_bytes).await?;
            Ok(Arc::new(store))
        }
    }
}
