//! Logger builder implementation

// External dependencies
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

// Internal crates
use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Holds the entered root span carrying the global fields. Dropping it exits
/// the span; the subscriber itself stays installed for the process.
#[derive(Debug)]
pub struct LoggerGuard {
    _root_span_guard: Option<tracing::span::EnteredSpan>,
}

/// Applies the display options shared by every format and boxes the layer.
/// Events go to stderr so hosts can keep stdout for responses.
macro_rules! create_fmt_layer {
    ($layer:expr, $display:expr) => {{
        let display = $display;
        let layer = $layer
            .with_writer(std::io::stderr)
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source);
        let boxed: Box<dyn Layer<Registry> + Send + Sync> = if display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        };
        boxed
    }};
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Parse the filter without installing anything
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {}", &self.config.level, e)))
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber was already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = self.filter()?;

        let fmt_layer = match self.config.format {
            Format::Pretty => create_fmt_layer!(fmt::layer().pretty(), &self.config.display),
            Format::Compact => create_fmt_layer!(fmt::layer().compact(), &self.config.display),
            Format::Json => create_fmt_layer!(
                fmt::layer().json().flatten_event(true),
                &self.config.display
            ),
        };

        Registry::default()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        // Create root span with global fields
        let root_span_guard = if self.config.fields.is_empty() {
            None
        } else {
            let fields = &self.config.fields;
            let root = tracing::info_span!(
                "app",
                service = fields.service.as_deref().unwrap_or(""),
                env = fields.env.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or("")
            );
            Some(root.entered())
        };

        Ok(LoggerGuard {
            _root_span_guard: root_span_guard,
        })
    }
}
