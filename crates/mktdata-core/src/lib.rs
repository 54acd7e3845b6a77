//! Core domain types for the market-data access layer.
//!
//! This crate provides the types and pure policies shared by the streaming
//! and request/response sides:
//! - `Instrument`: normalized (lower-case) symbol identifier
//! - `TradeEvent`, `Candle`, `InstrumentMetadata`: immutable market data records
//! - `reconcile`: subscription delta between the active and desired sets
//! - `Backoff`: capped exponential retry/reconnect delay
//! - `PriceChangeTracker`: per-instrument last-known-price bookkeeping

pub mod backoff;
pub mod error;
pub mod instrument;
pub mod price_change;
pub mod reconcile;
pub mod types;

pub use backoff::Backoff;
pub use error::{CoreError, Result};
pub use instrument::{Instrument, Interval};
pub use price_change::{PriceChange, PriceChangeTracker};
pub use reconcile::{reconcile, SubscriptionDelta};
pub use types::{Candle, InstrumentMetadata, TradeEvent};
