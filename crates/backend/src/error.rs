//! Backend error types
//!
//! Registration and deregistration failures are not errors at this level:
//! the write that triggered them is already persisted, so they surface as an
//! error [`Response`](crate::Response) instead.

use thiserror::Error;

use testing_secrets_storage::StorageError;

use crate::rotation::SchedulerError;

/// Errors returned by backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    /// Reading or writing storage failed; the operation was aborted
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A required role name was missing or empty
    #[error("no name")]
    MissingName,

    /// A role name contains characters outside `\w`, `-`, `.`, `/`
    #[error("invalid name '{name}': expected word characters, '-', '.' or '/' between word characters")]
    InvalidName { name: String },

    /// A write carried an unusable field value
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A rotation trigger path matched no known prefix
    #[error("unknown path: {path}")]
    UnknownPath { path: String },

    /// Rotation information could not be obtained from the scheduler
    #[error("rotation information unavailable: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Pushing a new password to the downstream system failed
    #[error("failed to apply new password for {target}: {reason}")]
    Apply { target: String, reason: String },

    /// Deliberate failure once the initialize count exceeds `low_check`
    #[error(
        "artificial initialize failure due to initialize count being higher than low_check: {count} vs {low_check}"
    )]
    InitializeThreshold { count: u8, low_check: i64 },

    /// The backend builder was not given a required collaborator
    #[error("backend is missing required component: {0}")]
    MissingComponent(&'static str),
}

impl BackendError {
    /// Whether the caller caused the error (bad input) rather than the backend
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingName
                | Self::InvalidName { .. }
                | Self::InvalidField { .. }
                | Self::UnknownPath { .. }
        )
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
