//! Connection liveness monitoring.
//!
//! Any inbound frame counts as a sign of life. After half the idle timeout
//! without traffic a ping is sent; after the full idle timeout the
//! connection is considered dead.

use std::time::{Duration, Instant};
use tracing::debug;

/// Liveness monitor for one connection session.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    idle_timeout: Duration,
    last_frame: Instant,
    last_ping: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            last_frame: Instant::now(),
            last_ping: None,
        }
    }

    /// Reset for a fresh session.
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.last_ping = None;
    }

    /// Record any inbound frame (text, ping, pong).
    pub fn record_frame(&mut self) {
        self.last_frame = Instant::now();
        if let Some(ping) = self.last_ping.take() {
            debug!(rtt_ms = ping.elapsed().as_millis() as u64, "Traffic after ping");
        }
    }

    /// Record that a ping was sent.
    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
    }

    pub fn idle_for(&self) -> Duration {
        self.last_frame.elapsed()
    }

    /// True when no frame arrived within the idle timeout.
    pub fn is_timed_out(&self) -> bool {
        self.idle_for() > self.idle_timeout
    }

    /// True when the link has been quiet long enough to ping it and no
    /// ping is outstanding.
    pub fn should_send_ping(&self) -> bool {
        self.last_ping.is_none() && self.idle_for() >= self.idle_timeout / 2
    }

    /// Interval between liveness checks.
    pub fn check_interval(&self) -> Duration {
        (self.idle_timeout / 4).max(Duration::from_millis(10))
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}
