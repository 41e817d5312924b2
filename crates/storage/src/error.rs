//! Storage error types

use thiserror::Error;

/// Errors returned by [`Storage`](crate::Storage) implementations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation
    #[error("storage backend failed for key '{key}': {reason}")]
    Backend { key: String, reason: String },

    /// Filesystem failure (file backend)
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded
    #[error("storage serialization error for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failure injected by `FaultyStorage`
    #[error("injected storage failure for key '{key}'")]
    Injected { key: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
