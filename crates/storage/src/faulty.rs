//! Fault-injection storage wrapper (tests only)

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Storage, StorageEntry, StorageError, StorageResult};

/// Operation a fault can be armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Put,
}

/// Wraps a storage and fails chosen operations on chosen keys
///
/// Faults stay armed until [`FaultyStorage::heal`] is called. Every
/// attempted `put` is recorded (including failed ones) so tests can assert
/// that nothing was written.
#[derive(Debug, Clone)]
pub struct FaultyStorage<S> {
    inner: S,
    faults: Arc<Mutex<HashSet<(Op, String)>>>,
    puts: Arc<Mutex<Vec<String>>>,
}

impl<S: Storage> FaultyStorage<S> {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::default(),
            puts: Arc::default(),
        }
    }

    /// Fail `op` on `key` until healed
    pub fn fail(&self, op: Op, key: impl Into<String>) -> &Self {
        self.faults.lock().insert((op, key.into()));
        self
    }

    /// Disarm every fault
    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    /// Keys of every attempted put, in order
    pub fn put_log(&self) -> Vec<String> {
        self.puts.lock().clone()
    }

    /// The wrapped storage
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: Op, key: &str) -> StorageResult<()> {
        if self.faults.lock().contains(&(op, key.to_string())) {
            return Err(StorageError::Injected {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Storage> Storage for FaultyStorage<S> {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        self.check(Op::Get, key)?;
        self.inner.get(key).await
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        self.puts.lock().push(entry.key.clone());
        self.check(Op::Put, &entry.key)?;
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    #[tokio::test]
    async fn armed_get_fails_until_healed() {
        let storage = FaultyStorage::new(MemoryStorage::new());
        storage.fail(Op::Get, "config");

        let err = storage.get("config").await.unwrap_err();
        assert!(matches!(err, StorageError::Injected { .. }));

        storage.heal();
        assert!(storage.get("config").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_put_is_logged_but_not_written() {
        let storage = FaultyStorage::new(MemoryStorage::new());
        storage.fail(Op::Put, "check");

        assert!(storage.put(StorageEntry::new("check", vec![1])).await.is_err());
        assert_eq!(storage.put_log(), vec!["check".to_string()]);
        assert!(storage.inner().is_empty());
    }
}
