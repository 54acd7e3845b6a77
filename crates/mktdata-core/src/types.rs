//! Market data records.
//!
//! All records are immutable once built. Decimal quantities are kept as the
//! exact strings received from the provider; parsing is only done on demand
//! for derived computations.

use crate::error::Result;
use crate::Instrument;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub instrument: Instrument,
    /// Trade price, verbatim from the wire.
    pub price: String,
    /// Trade quantity, verbatim from the wire.
    pub quantity: String,
    /// Event time (ms since epoch).
    pub event_time_ms: i64,
    pub trade_id: u64,
    /// Trade execution time (ms since epoch).
    pub trade_time_ms: i64,
    /// True when the buyer was the resting (maker) side.
    pub buyer_is_maker: bool,
}

impl TradeEvent {
    /// Parse the price for arithmetic. The stored string is unchanged.
    pub fn price_decimal(&self) -> Result<Decimal> {
        Ok(self.price.parse::<Decimal>()?)
    }

    /// Parse the quantity for arithmetic.
    pub fn quantity_decimal(&self) -> Result<Decimal> {
        Ok(self.quantity.parse::<Decimal>()?)
    }

    /// Event time as a UTC timestamp, if representable.
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.event_time_ms).single()
    }
}

/// Aggregated trade statistics for one kline bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time (ms since epoch).
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    /// Base asset volume.
    pub volume: String,
    /// Bucket close time (ms since epoch).
    pub close_time: i64,
    /// Quote asset volume.
    pub quote_volume: String,
    pub trade_count: u64,
    pub taker_buy_base_volume: String,
    pub taker_buy_quote_volume: String,
}

impl Candle {
    /// Open time as a UTC timestamp, if representable.
    pub fn open_time_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.open_time).single()
    }
}

/// Instrument directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMetadata {
    pub symbol: Instrument,
    pub trading_enabled: bool,
    #[serde(default)]
    pub base_asset: Option<String>,
    #[serde(default)]
    pub quote_asset: Option<String>,
}
