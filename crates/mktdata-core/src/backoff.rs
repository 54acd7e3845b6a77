//! Retry/reconnect delay policy.
//!
//! Capped exponential backoff shared by the streaming reconnect loop and the
//! historical data client. The policy itself is stateless; every caller keeps
//! its own attempt counter and resets it on success.

use std::time::Duration;

/// Default delay for the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Default ceiling for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Capped exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a policy. A `max` below `base` is raised to `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Convenience constructor from millisecond settings.
    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    /// Delay before attempt number `attempt` (0-based).
    ///
    /// Non-decreasing in `attempt` and never above the ceiling.
    pub fn delay(&self, attempt: u32) -> Duration {
        // 2^32 already exceeds any practical ceiling; clamp the shift.
        let exponent = attempt.min(31);
        let factor = 1u32 << exponent;
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
