//! # switchboard-logging
//!
//! `tracing` subscriber setup for the relay.
//!
//! Output goes to stdout (or stderr) as human-readable text or one JSON
//! object per line.
//! `RUST_LOG` takes precedence over the configured level when it is set.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a format name (case-insensitive). Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level directive (`trace`..`error`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Per-target overrides, e.g. `("switchboard_server::relay", "debug")`.
    pub module_levels: Vec<(String, String)>,
    /// Write to stderr instead of stdout.
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
            module_levels: Vec::new(),
            stderr: false,
        }
    }
}

impl LogConfig {
    /// Build the `EnvFilter` directive string for this config.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.level.trim().to_lowercase();
        if filter.is_empty() {
            filter.push_str("info");
        }
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{module}={}", level.to_lowercase()));
        }
        filter
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_subscriber(config: &LogConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, config.stderr) {
        (LogFormat::Text, false) => tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .boxed(),
        (LogFormat::Text, true) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .boxed(),
        (LogFormat::Json, false) => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        (LogFormat::Json, true) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
}
