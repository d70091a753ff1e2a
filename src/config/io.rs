//! Configuration I/O - Loading configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    load_config_with(None)
}

/// Same as [`load_config`] but with an explicit config file.
///
/// An explicit path must exist; the implicit one is optional.
pub fn load_config_with(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => load_config_from_path(path)?,
        None => {
            let config_path = super::paths::config_path();
            if config_path.exists() {
                load_config_from_path(&config_path)?
            } else {
                Config::default()
            }
        }
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set `JSBOX_*` variables.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Overlay overrides read through `lookup` onto `config`.
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Sandbox overrides
    if let Some(timeout) = lookup("JSBOX_TIMEOUT") {
        match parse_timeout(&timeout) {
            Ok(v) => config.sandbox.default_timeout = v,
            Err(e) => tracing::warn!(value = %timeout, error = %e, "ignoring JSBOX_TIMEOUT"),
        }
    }
    if let Some(path) = lookup("JSBOX_ARTIFACT_PATH") {
        config.sandbox.artifact_path = PathBuf::from(path);
    }
    if let Some(size) = lookup("JSBOX_WORKER_STACK_SIZE") {
        if let Ok(v) = size.parse() {
            config.sandbox.worker_stack_size = v;
        }
    }

    // Logging overrides
    if let Some(filter) = lookup("JSBOX_LOG") {
        config.logging.filter = filter;
    }
    if let Some(format) = lookup("JSBOX_LOG_FORMAT") {
        if let Ok(v) = format.parse() {
            config.logging.format = v;
        }
    }
}

/// Parse a timeout given either as bare seconds (`"2.5"`) or a humantime
/// duration (`"1500ms"`, `"1m 30s"`).
pub fn parse_timeout(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs > 0.0 {
            return Ok(Duration::from_secs_f64(secs));
        }
        return Err(Error::InvalidInput(format!("timeout must be positive, got {}", value)));
    }
    let duration = humantime::parse_duration(value)?;
    if duration.is_zero() {
        return Err(Error::InvalidInput("timeout must be positive".to_string()));
    }
    Ok(duration)
}
