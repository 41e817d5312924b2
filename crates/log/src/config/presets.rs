//! Presets for the two ways a host runs: one-shot commands and the
//! long-running scheduler loop

use super::{Config, DisplayConfig, Fields, Format};

const SERVICE_NAME: &str = "testing-secrets";

impl Config {
    /// Defaults overlaid with `TESTING_SECRETS_LOG*` / `RUST_LOG`
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// Apply environment overrides on top of `self`
    ///
    /// `TESTING_SECRETS_LOG` wins over `RUST_LOG`. Global fields are only
    /// replaced when at least one of them is set in the environment.
    #[must_use]
    pub fn overlay_env(mut self) -> Self {
        if let Some(level) = std::env::var("TESTING_SECRETS_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
        {
            self.level = level;
        }

        if let Ok(format) = std::env::var("TESTING_SECRETS_LOG_FORMAT") {
            self.format = Format::parse_lossy(&format);
        }

        self.display.parse_env();
        let fields = Fields::from_env();
        if !fields.is_empty() {
            self.fields = fields;
        }
        self
    }

    /// One-shot commands: warnings only, no timestamps, so stderr stays
    /// readable next to the JSON printed on stdout
    #[must_use]
    pub fn command() -> Self {
        Self {
            level: "warn".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                target: false,
                time: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Scheduler loop: JSON events tagged with the service name
    #[must_use]
    pub fn scheduler() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                ..DisplayConfig::default()
            },
            fields: Fields {
                service: Some(SERVICE_NAME.to_string()),
                ..Fields::default()
            },
        }
    }

    /// Replace the filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_preset_is_quiet() {
        let config = Config::command();
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, Format::Compact);
        assert!(!config.display.time);
    }

    #[test]
    fn scheduler_preset_tags_service() {
        let config = Config::scheduler();
        assert_eq!(config.format, Format::Json);
        assert!(!config.display.colors);
        assert_eq!(config.fields.service.as_deref(), Some("testing-secrets"));
    }

    #[test]
    fn with_level_overrides_filter() {
        let config = Config::command().with_level("testing_secrets_backend=trace");
        assert_eq!(config.level, "testing_secrets_backend=trace");
        assert_eq!(config.format, Format::Compact);
    }
}
