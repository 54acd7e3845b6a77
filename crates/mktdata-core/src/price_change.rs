//! Per-instrument last-known-price tracking.
//!
//! Owned by a single listener. The stored price and the reported change are
//! updated together in `observe`, so a change value always refers to the
//! price that immediately preceded the event.

use crate::{Instrument, TradeEvent};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Change between two consecutive observed prices of one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceChange {
    pub previous: Decimal,
    pub current: Decimal,
    /// Percentage change. `None` when the previous price was zero or the
    /// result does not fit in a `Decimal`.
    pub pct: Option<Decimal>,
}

/// Tracks the last observed price per instrument.
#[derive(Debug, Default)]
pub struct PriceChangeTracker {
    last: HashMap<Instrument, Decimal>,
}

impl PriceChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade and return the change from the previous observation.
    ///
    /// Returns `None` for the first observation of an instrument. A trade
    /// whose price does not parse is ignored and leaves the state untouched.
    pub fn observe(&mut self, event: &TradeEvent) -> Option<PriceChange> {
        let current = event.price_decimal().ok()?;
        let previous = self.last.insert(event.instrument.clone(), current)?;

        let pct = current
            .checked_sub(previous)
            .and_then(|diff| diff.checked_div(previous))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED));

        Some(PriceChange {
            previous,
            current,
            pct,
        })
    }

    /// Last observed price for an instrument.
    pub fn last_price(&self, instrument: &Instrument) -> Option<Decimal> {
        self.last.get(instrument).copied()
    }

    /// Drop state for an instrument (e.g., when it is no longer tracked).
    pub fn forget(&mut self, instrument: &Instrument) {
        self.last.remove(instrument);
    }
}
