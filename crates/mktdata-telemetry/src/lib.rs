//! Prometheus metrics and structured logging for the market-data layer.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus metrics for the stream connection, fan-out and history client

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with_filter};
pub use metrics::Metrics;
