//! Historical data error types.

use mktdata_core::CoreError;
use thiserror::Error;

/// Failure of a request/response call.
///
/// `Clone` so one in-flight result can be shared by every caller waiting on
/// the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Data unavailable after {attempts} attempts: {cause}")]
    DataUnavailable {
        attempts: u32,
        #[source]
        cause: Box<HistoryError>,
    },

    #[error("History client is shut down")]
    Shutdown,
}

impl HistoryError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }

    /// Metrics label.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Server { .. } => "server_error",
            Self::Validation(_) => "rejected",
            Self::Decode(_) => "decode_error",
            Self::DataUnavailable { .. } => "unavailable",
            Self::Shutdown => "shutdown",
        }
    }
}

impl From<CoreError> for HistoryError {
    fn from(e: CoreError) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_retryable_classes() {
        assert!(HistoryError::Transport("reset".into()).is_retryable());
        assert!(HistoryError::Server {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!HistoryError::Validation("bad".into()).is_retryable());
        assert!(!HistoryError::Decode("bad".into()).is_retryable());
        assert!(!HistoryError::Shutdown.is_retryable());
    }

    #[test]
    fn test_data_unavailable_keeps_cause() {
        let err = HistoryError::DataUnavailable {
            attempts: 4,
            cause: Box::new(HistoryError::Transport("connection reset".into())),
        };
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("Transport error: connection reset".to_string())
        );
    }
}
