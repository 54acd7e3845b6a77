//! Error types for mktdata-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid instrument: {0:?}")]
    InvalidInstrument(String),

    #[error("Invalid interval: {0:?}")]
    InvalidInterval(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(String),
}

impl From<rust_decimal::Error> for CoreError {
    fn from(e: rust_decimal::Error) -> Self {
        Self::DecimalParse(e.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
