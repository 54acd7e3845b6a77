//! Candle queries and kline decoding.

use crate::error::{HistoryError, HistoryResult};
use crate::transport::HttpRequest;
use mktdata_core::{Candle, Instrument, Interval};
use serde::de::IgnoredAny;
use tracing::warn;

/// Kline endpoint path.
pub const KLINES_PATH: &str = "/api/v3/klines";

/// Largest page the provider serves.
pub const MAX_LIMIT: u16 = 1000;

/// Parameters of one candle request. Also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleQuery {
    pub instrument: Instrument,
    pub interval: Interval,
    pub limit: u16,
    /// Inclusive lower bound on open time (ms).
    pub start_time: Option<i64>,
    /// Inclusive upper bound on open time (ms).
    pub end_time: Option<i64>,
}

impl CandleQuery {
    pub fn new(instrument: Instrument, interval: Interval, limit: u16) -> Self {
        Self {
            instrument,
            interval,
            limit,
            start_time: None,
            end_time: None,
        }
    }

    #[must_use]
    pub fn with_range(mut self, start_time: Option<i64>, end_time: Option<i64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Reject parameters the provider would refuse.
    pub fn validate(&self) -> HistoryResult<()> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(HistoryError::Validation(format!(
                "limit must be in 1..={MAX_LIMIT}, got {}",
                self.limit
            )));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(HistoryError::Validation(format!(
                    "start_time {start} is after end_time {end}"
                )));
            }
        }
        Ok(())
    }

    pub fn to_request(&self) -> HttpRequest {
        let mut request = HttpRequest::new(KLINES_PATH)
            .param("symbol", self.instrument.display_symbol())
            .param("interval", self.interval.as_str())
            .param("limit", self.limit);
        if let Some(start) = self.start_time {
            request = request.param("startTime", start);
        }
        if let Some(end) = self.end_time {
            request = request.param("endTime", end);
        }
        request
    }
}

/// One kline as sent by the provider: a fixed 12-element array.
type RawKline = (
    i64,         // 0 open time
    String,      // 1 open
    String,      // 2 high
    String,      // 3 low
    String,      // 4 close
    String,      // 5 volume
    i64,         // 6 close time
    String,      // 7 quote asset volume
    u64,         // 8 number of trades
    String,      // 9 taker buy base volume
    String,      // 10 taker buy quote volume
    IgnoredAny,  // 11 unused
);

/// Decode a kline response body.
///
/// Decimal fields are kept verbatim. The result is ordered by open time
/// with duplicate open times removed (first occurrence wins).
pub fn decode_klines(body: &str) -> HistoryResult<Vec<Candle>> {
    let raw: Vec<RawKline> = serde_json::from_str(body)
        .map_err(|e| HistoryError::Decode(format!("kline response: {e}")))?;

    let mut candles: Vec<Candle> = raw
        .into_iter()
        .map(
            |(
                open_time,
                open,
                high,
                low,
                close,
                volume,
                close_time,
                quote_volume,
                trade_count,
                taker_buy_base_volume,
                taker_buy_quote_volume,
                _,
            )| Candle {
                open_time,
                open,
                high,
                low,
                close,
                volume,
                close_time,
                quote_volume,
                trade_count,
                taker_buy_base_volume,
                taker_buy_quote_volume,
            },
        )
        .collect();

    // Stable sort keeps the first of equal open times in front.
    candles.sort_by_key(|c| c.open_time);
    let before = candles.len();
    candles.dedup_by_key(|c| c.open_time);
    if candles.len() != before {
        warn!(
            dropped = before - candles.len(),
            "Dropped candles with duplicate open time"
        );
    }

    Ok(candles)
}
