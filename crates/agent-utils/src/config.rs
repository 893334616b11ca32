//! Configuration management utilities

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Environment variable names read by [`Config::from_env`]
pub mod env {
    pub const ENVIRONMENT: &str = "TRADING_ENV";
    pub const RESULTS_DIR: &str = "TRADING_RESULTS_DIR";
    pub const FLUSH_INTERVAL_MS: &str = "TRADING_FLUSH_INTERVAL_MS";
    pub const EVENT_BUFFER: &str = "TRADING_EVENT_BUFFER";
    pub const WRITE_ATTEMPTS: &str = "TRADING_WRITE_ATTEMPTS";
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Root directory for persisted artifacts
    pub results_dir: PathBuf,
    /// Pause between buffered report events at flush time
    pub flush_interval_ms: u64,
    /// Capacity of a session's event channel
    pub event_buffer: usize,
    /// Attempts per artifact write
    pub write_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "trading-agents".to_string(),
            environment: "development".to_string(),
            results_dir: PathBuf::from("./results"),
            flush_interval_ms: 50,
            event_buffer: 256,
            write_attempts: 3,
        }
    }
}

impl Config {
    /// Defaults overlaid with `TRADING_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(environment) = lookup(env::ENVIRONMENT) {
            config.environment = environment;
        }
        if let Some(dir) = lookup(env::RESULTS_DIR) {
            config.results_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(env::FLUSH_INTERVAL_MS) {
            config.flush_interval_ms = parse(env::FLUSH_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(env::EVENT_BUFFER) {
            config.event_buffer = parse(env::EVENT_BUFFER, &raw)?;
        }
        if let Some(raw) = lookup(env::WRITE_ATTEMPTS) {
            config.write_attempts = parse(env::WRITE_ATTEMPTS, &raw)?;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
