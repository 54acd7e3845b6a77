//! Application error types.

use mktdata_history::HistoryError;
use mktdata_telemetry::TelemetryError;
use mktdata_ws::WsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Stream error: {0}")]
    Stream(#[from] Box<WsError>),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WsError> for AppError {
    fn from(e: WsError) -> Self {
        Self::Stream(Box::new(e))
    }
}

pub type AppResult<T> = Result<T, AppError>;
