//! Instrument directory.
//!
//! The directory is always replaced wholesale. The latest successful fetch
//! is published on a watch channel so any collaborator can read it at any
//! time or wait for the next refresh.

use crate::error::{HistoryError, HistoryResult};
use mktdata_core::{Instrument, InstrumentMetadata};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Directory endpoint path.
pub const EXCHANGE_INFO_PATH: &str = "/api/v3/exchangeInfo";

/// Status value of an actively tradable instrument.
pub const TRADING_STATUS: &str = "TRADING";

/// Latest published directory.
pub type InstrumentList = Arc<Vec<InstrumentMetadata>>;

#[derive(Debug, Deserialize)]
struct RawExchangeInfo {
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
struct RawSymbol {
    symbol: String,
    status: String,
    #[serde(rename = "baseAsset", default)]
    base_asset: Option<String>,
    #[serde(rename = "quoteAsset", default)]
    quote_asset: Option<String>,
}

/// Decode the directory response, keeping only tradable instruments.
///
/// Records with unusable symbols are skipped.
pub fn decode_exchange_info(body: &str) -> HistoryResult<Vec<InstrumentMetadata>> {
    let raw: RawExchangeInfo = serde_json::from_str(body)
        .map_err(|e| HistoryError::Decode(format!("exchange info response: {e}")))?;

    let total = raw.symbols.len();
    let instruments: Vec<InstrumentMetadata> = raw
        .symbols
        .into_iter()
        .filter(|s| s.status == TRADING_STATUS)
        .filter_map(|s| match Instrument::new(&s.symbol) {
            Ok(symbol) => Some(InstrumentMetadata {
                symbol,
                trading_enabled: true,
                base_asset: s.base_asset,
                quote_asset: s.quote_asset,
            }),
            Err(e) => {
                warn!(symbol = %s.symbol, error = %e, "Skipping directory entry");
                None
            }
        })
        .collect();

    info!(total, tradable = instruments.len(), "Decoded instrument directory");
    Ok(instruments)
}

/// Process-wide holder of the latest directory.
pub struct InstrumentDirectory {
    tx: watch::Sender<InstrumentList>,
}

impl InstrumentDirectory {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    /// Latest published list (empty before the first successful fetch).
    pub fn latest(&self) -> InstrumentList {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every future publication.
    pub fn subscribe(&self) -> watch::Receiver<InstrumentList> {
        self.tx.subscribe()
    }

    /// Replace the published list.
    pub fn publish(&self, instruments: Vec<InstrumentMetadata>) -> InstrumentList {
        let list = Arc::new(instruments);
        self.tx.send_replace(list.clone());
        list
    }
}

impl Default for InstrumentDirectory {
    fn default() -> Self {
        Self::new()
    }
}
