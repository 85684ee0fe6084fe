//! Layered settings: defaults, then a JSON file, then environment variables.
//!
//! CLI flags are applied on top by `main`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_logging::{LogConfig, LogFormat};
use switchboard_server::ServerConfig;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON or has the wrong shape.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Everything the binary can be configured with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardSettings {
    /// Listener, limits, heartbeat.
    pub server: ServerConfig,
    /// Log level and format.
    pub logging: LogConfig,
}

/// `~/.switchboard/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".switchboard").join("settings.json")
}

/// Load settings with environment overrides applied.
///
/// An explicit `path` must exist. Without one, the default path is used if
/// present and compiled defaults otherwise.
pub fn load(path: Option<&Path>) -> Result<SwitchboardSettings, SettingsError> {
    let mut settings = match path {
        Some(path) if !path.exists() => return Err(SettingsError::NotFound(path.to_path_buf())),
        Some(path) => load_from_path(path)?,
        None => load_from_path(&settings_path())?,
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Read `path` and deep-merge it over the defaults. A missing file yields
/// the defaults.
pub fn load_from_path(path: &Path) -> Result<SwitchboardSettings, SettingsError> {
    let defaults = serde_json::to_value(SwitchboardSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursively merge `source` into `target`. Objects merge key by key;
/// anything else in `source` replaces `target`. `null` in `source` is ignored.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (target, Value::Null) => target,
        (_, source) => source,
    }
}

/// Apply `SWITCHBOARD_*` (and bare `PORT`) environment variables.
pub fn apply_env_overrides(settings: &mut SwitchboardSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and
/// ignored. `SWITCHBOARD_PORT` wins over `PORT`.
pub fn apply_overrides_from(
    settings: &mut SwitchboardSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    for name in ["PORT", "SWITCHBOARD_PORT"] {
        if let Some(v) = read(name) {
            match parse_port(&v) {
                Some(port) => settings.server.port = port,
                None => warn!(key = name, value = %v, "invalid port, ignoring"),
            }
        }
    }
    if let Some(v) = read("SWITCHBOARD_HOST") {
        settings.server.host = v.trim().to_owned();
    }
    if let Some(v) = read("SWITCHBOARD_MAX_CONNECTIONS") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.server.max_connections = n,
            None => warn!(
                key = "SWITCHBOARD_MAX_CONNECTIONS",
                value = %v,
                "invalid connection limit, ignoring"
            ),
        }
    }
    if let Some(v) = read("SWITCHBOARD_LOG_LEVEL") {
        match parse_level(&v) {
            Some(level) => settings.logging.level = level,
            None => warn!(key = "SWITCHBOARD_LOG_LEVEL", value = %v, "invalid log level, ignoring"),
        }
    }
    if let Some(v) = read("SWITCHBOARD_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => {
                warn!(key = "SWITCHBOARD_LOG_FORMAT", value = %v, "invalid log format, ignoring");
            }
        }
    }
}

/// Parse a TCP port. `0` is allowed and means auto-assign.
pub fn parse_port(val: &str) -> Option<u16> {
    val.trim().parse().ok()
}

/// Parse a `usize` within `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Normalize a tracing level name.
pub fn parse_level(val: &str) -> Option<String> {
    let level = val.trim().to_lowercase();
    matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error" | "off").then_some(level)
}
