//! Real-time market-data access layer.
//!
//! Composes the streaming and request/response sides behind one facade:
//! - One multiplexed trade stream, steered by `set_desired_symbols`
//! - Trade event fan-out to any number of listeners
//! - Historical candles with retry and short-lived caching
//! - Instrument directory with a latest-value holder

pub mod config;
pub mod error;
pub mod facade;

pub use config::{AppConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
pub use facade::MarketData;

pub use mktdata_core::{
    Candle, Instrument, InstrumentMetadata, Interval, PriceChange, PriceChangeTracker, TradeEvent,
};
pub use mktdata_history::{HistoricalSummary, HistoryConfig, InstrumentList};
pub use mktdata_ws::{ConnectionConfig, ConnectionState, TradeStream};
