//! Configuration loader
//!
//! Loads the connectivity configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the environment if one exists
//! 2. Attempts to load from environment variables
//! 3. If the backend variables are missing, falls back to loading from file
//! 4. Probes multiple paths for config files
//! 5. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! - `UNIMOGHUB_BACKEND_URL`: Backend base URL (required)
//! - `UNIMOGHUB_ANON_KEY`: Public anon key (required)
//! - `UNIMOGHUB_HEALTH_RESOURCE`: Resource probed by health checks
//! - `UNIMOGHUB_FAILURE_THRESHOLD`: Request circuit breaker threshold
//! - `UNIMOGHUB_MAX_RETRIES`: Request retry attempts
//! - `UNIMOGHUB_REFRESH_BUFFER_MINUTES`: Proactive refresh lead time
//! - `UNIMOGHUB_MONITORING_ENABLED`: Periodic auth health check (true/false)
//! - `UNIMOGHUB_CREDENTIALS_PATH`: File backing the credential store
//! - `UNIMOGHUB_LOG_LEVEL`: Default log filter
//! - `UNIMOGHUB_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./unimoghub.json` or `./unimoghub.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use unimoghub_domain::{ConnectivityConfig, Result, UnimogHubError};

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `UnimogHubError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<ConnectivityConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(error = %err, "Ignoring unreadable .env file"),
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The backend URL and anon key are required; every other setting keeps its
/// default unless its variable is set.
///
/// # Errors
/// Returns `UnimogHubError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<ConnectivityConfig> {
    let mut config = ConnectivityConfig::default();
    config.backend.url = env_var("UNIMOGHUB_BACKEND_URL")?;
    config.backend.anon_key = env_var("UNIMOGHUB_ANON_KEY")?;

    if let Ok(resource) = std::env::var("UNIMOGHUB_HEALTH_RESOURCE") {
        config.backend.health_resource = resource;
    }
    if let Some(threshold) = env_parse("UNIMOGHUB_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = threshold;
    }
    if let Some(retries) = env_parse("UNIMOGHUB_MAX_RETRIES")? {
        config.retry.max_attempts = retries;
    }
    if let Some(minutes) = env_parse("UNIMOGHUB_REFRESH_BUFFER_MINUTES")? {
        config.token.refresh_buffer_minutes = minutes;
    }
    config.recovery.monitoring_enabled =
        env_bool("UNIMOGHUB_MONITORING_ENABLED", config.recovery.monitoring_enabled);
    config.storage.file_path = std::env::var("UNIMOGHUB_CREDENTIALS_PATH").ok();
    if let Ok(level) = std::env::var("UNIMOGHUB_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("UNIMOGHUB_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `UnimogHubError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ConnectivityConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(UnimogHubError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            UnimogHubError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| UnimogHubError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ConnectivityConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| UnimogHubError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| UnimogHubError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(UnimogHubError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> [PathBuf; 8] {
    [
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("unimoghub.json"),
        dir.join("unimoghub.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
///
/// # Errors
/// Returns `UnimogHubError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| UnimogHubError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional numeric environment variable
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| UnimogHubError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
