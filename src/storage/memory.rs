use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::errors::{StorageError, StorageResult};

/// In-process store; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    max_value_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values larger than `max_value_bytes`
    pub fn with_quota(max_value_bytes: Option<usize>) -> Self {
        Self {
            entries: Arc::default(),
            max_value_bytes,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(limit) = self.max_value_bytes
            && value.len() > limit
        {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                size: value.len(),
                limit,
            });
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
