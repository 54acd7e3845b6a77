//! Historical data client configuration.

use mktdata_core::Backoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// REST base URL (no trailing path).
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// How long a successful candle result may be reused.
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REST_URL.to_string(),
            request_timeout_ms: 10_000,
            max_retries: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 5000,
            cache_ttl_ms: 5000,
            cache_max_entries: 256,
        }
    }
}

impl HistoryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::from_millis(self.retry_base_delay_ms, self.retry_max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Total attempts per call, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
