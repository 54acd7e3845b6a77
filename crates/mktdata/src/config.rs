//! Application configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working configuration against the public
//! endpoints.

use crate::error::{AppError, AppResult};
use mktdata_history::HistoryConfig;
use mktdata_telemetry::logging::DEFAULT_FILTER;
use mktdata_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "MKTDATA_CONFIG";

/// Config file used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Streaming connection.
    #[serde(default)]
    pub stream: ConnectionConfig,
    /// Historical data client.
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Instruments to stream from startup.
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl AppConfig {
    /// Load from `MKTDATA_CONFIG` or the default path, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_or_default(&config_path)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.stream.url.starts_with("ws://") || self.stream.url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "stream.url must be a ws:// or wss:// URL, got {:?}",
                self.stream.url
            )));
        }
        if !(self.history.base_url.starts_with("http://")
            || self.history.base_url.starts_with("https://"))
        {
            return Err(AppError::Config(format!(
                "history.base_url must be an http:// or https:// URL, got {:?}",
                self.history.base_url
            )));
        }
        if self.stream.fanout_capacity == 0 {
            return Err(AppError::Config(
                "stream.fanout_capacity must be positive".to_string(),
            ));
        }
        if self.stream.idle_timeout_ms == 0 {
            return Err(AppError::Config(
                "stream.idle_timeout_ms must be positive".to_string(),
            ));
        }
        if self.history.cache_max_entries == 0 {
            return Err(AppError::Config(
                "history.cache_max_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
