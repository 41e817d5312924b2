//! Logger configuration

mod presets;

use serde::{Deserialize, Serialize};

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info` or `testing_secrets_backend=debug`
    pub level: String,
    /// Output format
    pub format: Format,
    /// Display options
    pub display: DisplayConfig,
    /// Global fields attached to every event through the root span
    pub fields: Fields,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            fields: Fields::default(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl Format {
    /// Parse a format name; unknown names fall back to [`Format::Compact`]
    pub fn parse_lossy(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// What to render besides the message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colors
    pub colors: bool,
    /// Event target (module path)
    pub target: bool,
    /// Source file and line
    pub source: bool,
    /// Timestamps
    pub time: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            target: true,
            source: false,
            time: true,
        }
    }
}

impl DisplayConfig {
    /// Override flags from `TESTING_SECRETS_LOG_{COLORS,TARGET,SOURCE,TIME}`
    pub(crate) fn parse_env(&mut self) {
        let flag = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        };

        if let Some(v) = flag("TESTING_SECRETS_LOG_COLORS") {
            self.colors = v;
        }
        if let Some(v) = flag("TESTING_SECRETS_LOG_TARGET") {
            self.target = v;
        }
        if let Some(v) = flag("TESTING_SECRETS_LOG_SOURCE") {
            self.source = v;
        }
        if let Some(v) = flag("TESTING_SECRETS_LOG_TIME") {
            self.time = v;
        }
    }
}

/// Global fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    pub service: Option<String>,
    pub env: Option<String>,
    pub version: Option<String>,
}

impl Fields {
    /// Read `TESTING_SECRETS_SERVICE`, `TESTING_SECRETS_ENV`, `TESTING_SECRETS_VERSION`
    pub fn from_env() -> Self {
        Self {
            service: std::env::var("TESTING_SECRETS_SERVICE").ok(),
            env: std::env::var("TESTING_SECRETS_ENV").ok(),
            version: std::env::var("TESTING_SECRETS_VERSION").ok(),
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.env.is_none() && self.version.is_none()
    }
}
