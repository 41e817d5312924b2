//! Initialization counter
//!
//! Counts how many times the host has driven the initialization hook. The
//! count lives in a single byte under [`INITIALIZE_CHECK_ENTRY`] and always
//! advances, even when the call fails the `low_check` threshold, so a host
//! can exercise its retry handling by lowering the threshold.

use std::fmt;
use std::sync::Arc;

use testing_secrets_storage::{Storage, StorageEntry};

use crate::consts::INITIALIZE_CHECK_ENTRY;
use crate::error::{BackendError, BackendResult};
use crate::store::ConfigStore;

/// Persisted initialize counter
#[derive(Clone)]
pub struct InitializationCounter {
    storage: Arc<dyn Storage>,
    config: ConfigStore,
}

impl fmt::Debug for InitializationCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationCounter").finish_non_exhaustive()
    }
}

impl InitializationCounter {
    pub fn new(storage: Arc<dyn Storage>, config: ConfigStore) -> Self {
        Self { storage, config }
    }

    /// Stored count; `0` before the first initialize
    pub async fn count(&self) -> BackendResult<u8> {
        let entry = self.storage.get(INITIALIZE_CHECK_ENTRY).await?;
        Ok(entry
            .and_then(|entry| entry.value.first().copied())
            .unwrap_or(0))
    }

    /// Record one initialize call and return the new count
    ///
    /// The first call ever stores `1` and always succeeds. Later calls store
    /// the incremented count and then fail with
    /// [`BackendError::InitializeThreshold`] when the root credential's
    /// `low_check` is non-zero and below the new count. The count wraps after
    /// 255.
    pub async fn initialize(&self) -> BackendResult<u8> {
        let Some(entry) = self.storage.get(INITIALIZE_CHECK_ENTRY).await? else {
            self.store(1).await?;
            tracing::info!(count = 1, "initialize");
            return Ok(1);
        };

        let count = entry.value.first().copied().unwrap_or(0).wrapping_add(1);
        let config = self.config.get().await?;
        self.store(count).await?;

        if config.low_check != 0 && i64::from(count) > config.low_check {
            tracing::warn!(count, low_check = config.low_check, "initialize count above low_check");
            return Err(BackendError::InitializeThreshold {
                count,
                low_check: config.low_check,
            });
        }

        tracing::info!(count, "initialize");
        Ok(count)
    }

    async fn store(&self, count: u8) -> BackendResult<()> {
        self.storage
            .put(StorageEntry::new(INITIALIZE_CHECK_ENTRY, vec![count]))
            .await?;
        Ok(())
    }
}
