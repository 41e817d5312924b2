//! Backend settings supplied by the host

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::VERSION;
use crate::error::{BackendError, BackendResult};

/// Longest downstream-apply delay accepted
pub const MAX_ROTATION_WAIT: Duration = Duration::from_secs(3600);

/// Host-provided settings of one backend instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Mount point sent with every scheduler request (e.g. "testing-secrets/")
    pub mount_point: String,

    /// Simulated duration of pushing a new password downstream
    #[serde(with = "humantime_serde")]
    pub rotation_wait: Duration,

    /// Version reported to the host, without the leading `v`
    pub running_version: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            mount_point: "testing-secrets/".into(),
            rotation_wait: Duration::ZERO,
            running_version: VERSION.into(),
        }
    }
}

impl BackendSettings {
    /// Check the settings before building a backend
    pub fn validate(&self) -> BackendResult<()> {
        if self.mount_point.trim().is_empty() {
            return Err(BackendError::InvalidField {
                field: "mount_point",
                reason: "must not be empty".into(),
            });
        }

        if self.rotation_wait > MAX_ROTATION_WAIT {
            return Err(BackendError::InvalidField {
                field: "rotation_wait",
                reason: format!(
                    "must be at most {}",
                    humantime::format_duration(MAX_ROTATION_WAIT)
                ),
            });
        }

        if self.running_version.trim().is_empty() {
            return Err(BackendError::InvalidField {
                field: "running_version",
                reason: "must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Version string as reported to the host (`v0.0.1`)
    pub fn version_string(&self) -> String {
        format!("v{}", self.running_version.trim_start_matches('v'))
    }
}
