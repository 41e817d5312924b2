//! The storage trait and typed helpers

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{StorageError, StorageResult};

/// A single stored value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Storage key, e.g. `config` or `static-role/db1`
    pub key: String,
    /// Raw value bytes
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Create a new entry
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Durable string-keyed storage
///
/// # Contract
///
/// - `get` of a missing key is `Ok(None)`, never an error
/// - `put` replaces any previous value for the key
/// - each call is atomic for its key; nothing spans two calls
/// - `list(prefix)` returns the keys directly below `prefix`, relative to it,
///   sorted; nested keys surface as `child/` (one level)
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read an entry
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>>;

    /// Write an entry, replacing any previous value
    async fn put(&self, entry: StorageEntry) -> StorageResult<()>;

    /// Remove an entry; removing a missing key succeeds
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List keys below `prefix`
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Read and decode a JSON value stored under `key`
pub async fn get_json<T>(storage: &dyn Storage, key: &str) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(entry) = storage.get(key).await? else {
        return Ok(None);
    };

    serde_json::from_slice(&entry.value)
        .map(Some)
        .map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })
}

/// Encode `value` as JSON and store it under `key`
pub async fn put_json<T>(storage: &dyn Storage, key: &str, value: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })?;
    storage.put(StorageEntry::new(key, bytes)).await
}

/// Shared `list` semantics for map-backed storages
pub(crate) fn list_below<'a>(keys: impl Iterator<Item = &'a String>, prefix: &str) -> Vec<String> {
    let prefix = if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    };

    let mut out: Vec<String> = keys
        .filter_map(|key| key.strip_prefix(prefix.as_str()))
        .filter(|rest| !rest.is_empty())
        .map(|rest| match rest.find('/') {
            Some(idx) => rest[..=idx].to_string(),
            None => rest.to_string(),
        })
        .collect();
    out.sort();
    out.dedup();
    out
}
