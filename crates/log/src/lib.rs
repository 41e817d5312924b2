//! # testing-secrets log
//!
//! Thin `tracing-subscriber` setup shared by every testing-secrets host.
//!
//! ```rust,ignore
//! use testing_secrets_log::{Config, init_with};
//!
//! let _guard = init_with(Config::scheduler().overlay_env())?;
//! tracing::info!(path = "config", "backend ready");
//! ```
//!
//! The returned [`LoggerGuard`] keeps the root span (carrying the global
//! [`Fields`]) entered; drop it on shutdown.
#![forbid(unsafe_code)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Fields, Format};
pub use error::{LogError, LogResult};

/// Initialize logging from `TESTING_SECRETS_LOG*` / `RUST_LOG`
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}

/// Initialize logging with an explicit configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
