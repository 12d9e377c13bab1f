//! Configuration Module
//!
//! Handles loading and managing gateway configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GateError, Result};

/// Gateway configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of cached upstream documents
    pub cache_capacity: usize,
    /// Lifetime of a cached document, in seconds
    pub cache_ttl: u64,
    /// Lifetime of a cached upstream failure, in seconds
    pub cache_failure_ttl: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Maximum number of outstanding settings challenges
    pub nonce_capacity: usize,
    /// Lifetime of a settings challenge, in seconds
    pub nonce_ttl: u64,
    /// Upstream calls allowed back-to-back
    pub throttle_burst: u32,
    /// Upstream tokens refilled per second
    pub throttle_refill_per_sec: f64,
    /// Directory holding upstream documents
    pub upstream_data_dir: PathBuf,
    /// Settings file; in-memory settings when unset
    pub settings_file: Option<PathBuf>,
    /// Shared secret for settings updates; empty disables updates
    pub settings_password: String,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reads a secret from `var`, or from the file named by `file_var` when
/// `var` is empty.
///
/// # Errors
/// `GateError::Config` if `file_var` names an unreadable file.
pub fn load_secret(var: &str, file_var: &str) -> Result<String> {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    let path = match env::var(file_var) {
        Ok(path) if !path.is_empty() => path,
        _ => return Ok(String::new()),
    };

    std::fs::read_to_string(&path)
        .map_err(|e| GateError::Config(format!("cannot read {} ({}): {}", file_var, path, e)))
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `CACHE_CAPACITY` - Cached documents (default: 20)
    /// - `CACHE_TTL` - Document TTL in seconds (default: 3600)
    /// - `CACHE_FAILURE_TTL` - Failure TTL in seconds (default: `CACHE_TTL`)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `NONCE_CAPACITY` - Outstanding challenges (default: 10)
    /// - `NONCE_TTL` - Challenge TTL in seconds (default: 10)
    /// - `THROTTLE_BURST` - Upstream burst size (default: 3)
    /// - `THROTTLE_REFILL_PER_SEC` - Upstream refill rate (default: 1.0)
    /// - `UPSTREAM_DATA_DIR` - Upstream document directory (default: `data`)
    /// - `SETTINGS_FILE` - Settings file (default: in-memory settings)
    /// - `SETTINGS_PASSWORD` / `SETTINGS_PASSWORD_FILE` - Shared secret
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let cache_ttl = env_or("CACHE_TTL", defaults.cache_ttl);

        Ok(Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity),
            cache_ttl,
            cache_failure_ttl: env_or("CACHE_FAILURE_TTL", cache_ttl),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            nonce_capacity: env_or("NONCE_CAPACITY", defaults.nonce_capacity),
            nonce_ttl: env_or("NONCE_TTL", defaults.nonce_ttl),
            throttle_burst: env_or("THROTTLE_BURST", defaults.throttle_burst),
            throttle_refill_per_sec: env_or(
                "THROTTLE_REFILL_PER_SEC",
                defaults.throttle_refill_per_sec,
            ),
            upstream_data_dir: env::var("UPSTREAM_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upstream_data_dir),
            settings_file: env::var("SETTINGS_FILE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            settings_password: load_secret("SETTINGS_PASSWORD", "SETTINGS_PASSWORD_FILE")?,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn cache_failure_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_failure_ttl)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            cache_capacity: 20,
            cache_ttl: 3600,
            cache_failure_ttl: 3600,
            cleanup_interval: 60,
            nonce_capacity: 10,
            nonce_ttl: 10,
            throttle_burst: 3,
            throttle_refill_per_sec: 1.0,
            upstream_data_dir: PathBuf::from("data"),
            settings_file: None,
            settings_password: String::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_port", &self.server_port)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_failure_ttl", &self.cache_failure_ttl)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("nonce_capacity", &self.nonce_capacity)
            .field("nonce_ttl", &self.nonce_ttl)
            .field("throttle_burst", &self.throttle_burst)
            .field("throttle_refill_per_sec", &self.throttle_refill_per_sec)
            .field("upstream_data_dir", &self.upstream_data_dir)
            .field("settings_file", &self.settings_file)
            .field("settings_password", &"<redacted>")
            .finish()
    }
}
