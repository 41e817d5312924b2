//! In-memory storage

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::storage::list_below;
use crate::{Storage, StorageEntry, StorageResult};

/// In-memory storage backed by a shared ordered map
///
/// Clones share the same map, so a test can hand one clone to the backend
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Raw bytes stored under `key`, bypassing the async API
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        Ok(self
            .entries
            .read()
            .get(key)
            .map(|value| StorageEntry::new(key, value.clone())))
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        self.entries.write().insert(entry.key, entry.value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(list_below(self.entries.read().keys(), prefix))
    }
}
