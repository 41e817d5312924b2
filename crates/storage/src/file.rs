//! File-backed storage
//!
//! The whole key space lives in one JSON document (`key -> base64 value`).
//! Every mutation rewrites the document through a temp file and a rename, so
//! a crash leaves either the old or the new snapshot on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::Mutex;

use crate::storage::list_below;
use crate::{Storage, StorageEntry, StorageError, StorageResult};

/// Storage persisted to a single JSON file
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write of the snapshot within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Use `path` as the snapshot file; it is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StorageError::Serialization {
                    key: self.path.display().to_string(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &BTreeMap<String, String>) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec_pretty(snapshot).map_err(|source| StorageError::Serialization {
                key: self.path.display().to_string(),
                source,
            })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(
            path = %self.path.display(),
            entries = snapshot.len(),
            "storage snapshot written"
        );
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        let _guard = self.lock.lock().await;
        let snapshot = self.load().await?;

        let Some(encoded) = snapshot.get(key) else {
            return Ok(None);
        };
        let value = STANDARD
            .decode(encoded)
            .map_err(|e| StorageError::Backend {
                key: key.to_string(),
                reason: format!("invalid base64 value: {e}"),
            })?;
        Ok(Some(StorageEntry::new(key, value)))
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.load().await?;
        snapshot.insert(entry.key, STANDARD.encode(entry.value));
        self.save(&snapshot).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.load().await?;
        if snapshot.remove(key).is_some() {
            self.save(&snapshot).await?;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        let snapshot = self.load().await?;
        Ok(list_below(snapshot.keys(), prefix))
    }
}
