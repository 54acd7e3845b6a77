//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Idle timeout: no frame for {0} ms")]
    IdleTimeout(u64),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "connect_failed",
            Self::ConnectionClosed { .. } => "closed",
            Self::SendFailed(_) => "send_failed",
            Self::Decode(_) => "decode",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::Tungstenite(_) => "transport",
            Self::Json(_) => "json",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
