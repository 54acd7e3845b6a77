//! Prometheus metrics for the market-data layer.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. Registration only fails
//! on duplicate metric names, which is a programming error caught on first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, register_int_gauge_vec,
    CounterVec, IntCounter, IntGauge, IntGaugeVec,
};

/// Stream connection state (1 = active, 0 = inactive).
/// Labels: state (disconnected/connecting/open/closing)
pub static WS_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "mktdata_ws_state",
        "Stream connection state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mktdata_ws_reconnect_total",
        "Total stream reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Subscribe/unsubscribe commands sent.
pub static WS_COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mktdata_ws_commands_total",
        "Total subscription commands sent",
        &["method"]
    )
    .unwrap()
});

/// Instruments currently believed subscribed on the wire.
pub static WS_ACTIVE_INSTRUMENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "mktdata_ws_active_instruments",
        "Instruments in the active subscription set"
    )
    .unwrap()
});

/// Inbound frames dropped because they could not be decoded.
pub static FRAMES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mktdata_frames_dropped_total",
        "Inbound frames dropped on decode failure"
    )
    .unwrap()
});

/// Trade events published to the fan-out.
pub static TRADES_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mktdata_trades_published_total",
        "Trade events published to listeners"
    )
    .unwrap()
});

/// Trade events skipped by lagging listeners.
pub static LISTENER_LAGGED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mktdata_listener_lagged_total",
        "Trade events dropped for lagging listeners"
    )
    .unwrap()
});

/// Historical data requests by endpoint and outcome.
pub static HISTORY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mktdata_history_requests_total",
        "Historical data requests",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// Historical data retries by endpoint.
pub static HISTORY_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mktdata_history_retries_total",
        "Historical data retry attempts",
        &["endpoint"]
    )
    .unwrap()
});

/// Candle cache lookups by result.
pub static CACHE_LOOKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mktdata_cache_lookups_total",
        "Candle cache lookups",
        &["result"]
    )
    .unwrap()
});

const WS_STATES: [&str; 4] = ["disconnected", "connecting", "open", "closing"];

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Mark `state` as the current connection state.
    pub fn ws_state(state: &str) {
        for s in WS_STATES {
            WS_STATE
                .with_label_values(&[s])
                .set(i64::from(s == state));
        }
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn ws_command_sent(method: &str) {
        WS_COMMANDS_TOTAL.with_label_values(&[method]).inc();
    }

    pub fn ws_active_instruments(count: usize) {
        WS_ACTIVE_INSTRUMENTS.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn frame_dropped() {
        FRAMES_DROPPED_TOTAL.inc();
    }

    pub fn trade_published() {
        TRADES_PUBLISHED_TOTAL.inc();
    }

    pub fn listener_lagged(skipped: u64) {
        LISTENER_LAGGED_TOTAL.inc_by(skipped);
    }

    pub fn history_request(endpoint: &str, outcome: &str) {
        HISTORY_REQUESTS_TOTAL
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    pub fn history_retry(endpoint: &str) {
        HISTORY_RETRIES_TOTAL.with_label_values(&[endpoint]).inc();
    }

    pub fn cache_hit() {
        CACHE_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
    }

    pub fn cache_miss() {
        CACHE_LOOKUPS_TOTAL.with_label_values(&["miss"]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
