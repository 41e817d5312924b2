//! Logging errors

/// Errors raised while setting up logging
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The filter directive string could not be parsed
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Result type for logging setup
pub type LogResult<T> = Result<T, LogError>;
