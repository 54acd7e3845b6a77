//! Request/response side of the market-data layer.
//!
//! - Candle series over `GET /api/v3/klines`, decoded positionally
//! - Per-call retry with capped exponential backoff (transport and 5xx only)
//! - Candle cache that shares in-flight requests and reuses fresh results
//! - Instrument directory published on a watch channel
//! - Historical summary: three lookbacks fetched concurrently

pub mod cache;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod kline;
pub mod transport;

pub use cache::CandleCache;
pub use client::{HistoricalSummary, HistoryClient};
pub use config::{HistoryConfig, DEFAULT_REST_URL};
pub use directory::{decode_exchange_info, InstrumentDirectory, InstrumentList};
pub use error::{HistoryError, HistoryResult};
pub use kline::{decode_klines, CandleQuery, MAX_LIMIT};
pub use transport::{
    DynHttpTransport, HttpRequest, HttpResponse, HttpTransport, MockTransport, ReqwestTransport,
};
