//! WebSocket message types.

use crate::error::{WsError, WsResult};
use mktdata_core::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Outgoing control commands
// ============================================================================

/// Control command method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandMethod {
    Subscribe,
    Unsubscribe,
}

impl CommandMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

/// Outbound subscribe/unsubscribe command.
///
/// Wire format: `{"method":"SUBSCRIBE","params":["btcusdt@trade"],"id":1}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCommand {
    pub method: CommandMethod,
    pub params: Vec<String>,
    /// Locally unique request ID, echoed by the acknowledgment.
    pub id: u64,
}

impl StreamCommand {
    /// Build a command for a set of instruments (trade streams).
    pub fn new(method: CommandMethod, instruments: &BTreeSet<Instrument>, id: u64) -> Self {
        Self {
            method,
            params: instruments.iter().map(Instrument::stream_name).collect(),
            id,
        }
    }

    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Incoming frames
// ============================================================================

/// Trade event as sent by the provider.
///
/// Format: `{"e":"trade","E":123,"s":"BNBBTC","t":12345,"p":"0.001","q":"100",
/// "b":88,"a":50,"T":123,"m":true,"M":true}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeFrame {
    /// Event type, always "trade".
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time (ms).
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol (upper-case on the wire).
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub trade_id: u64,
    /// Price, kept as a string.
    #[serde(rename = "p")]
    pub price: String,
    /// Quantity, kept as a string.
    #[serde(rename = "q")]
    pub quantity: String,
    /// Buyer order ID (absent on newer stream versions).
    #[serde(rename = "b", default)]
    pub buyer_order_id: Option<u64>,
    /// Seller order ID (absent on newer stream versions).
    #[serde(rename = "a", default)]
    pub seller_order_id: Option<u64>,
    /// Trade time (ms).
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Is the buyer the market maker?
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

/// Command error payload: `{"code":2,"msg":"Invalid request"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandErrorPayload {
    pub code: i64,
    pub msg: String,
}

/// Classified inbound application frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Trade event.
    Trade(TradeFrame),
    /// Command acknowledgment: `{"result":null,"id":1}`.
    Ack {
        id: u64,
        result: serde_json::Value,
    },
    /// Command rejection: `{"error":{...},"id":1}`.
    CommandError {
        id: Option<u64>,
        error: CommandErrorPayload,
    },
    /// Any other shape; ignored by the caller.
    Other,
}

impl InboundFrame {
    /// Decode and classify a text frame.
    ///
    /// Invalid JSON, or an object that claims to be a trade but does not
    /// match the trade shape, is a decode error. Combined-stream envelopes
    /// (`{"stream":..,"data":{..}}`) are unwrapped first.
    pub fn parse(text: &str) -> WsResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| WsError::Decode(format!("invalid JSON: {e}")))?;
        Self::classify(value)
    }

    fn classify(value: serde_json::Value) -> WsResult<Self> {
        let serde_json::Value::Object(mut map) = value else {
            return Ok(Self::Other);
        };

        if map.contains_key("stream") {
            if let Some(data) = map.remove("data") {
                return Self::classify(data);
            }
        }

        if let Some(event_type) = map.get("e").and_then(|v| v.as_str()) {
            if event_type != "trade" {
                return Ok(Self::Other);
            }
            let frame: TradeFrame = serde_json::from_value(serde_json::Value::Object(map))
                .map_err(|e| WsError::Decode(format!("malformed trade: {e}")))?;
            return Ok(Self::Trade(frame));
        }

        let id = map.get("id").and_then(|v| v.as_u64());

        if let Some(error) = map.remove("error") {
            let error: CommandErrorPayload = serde_json::from_value(error)
                .map_err(|e| WsError::Decode(format!("malformed command error: {e}")))?;
            return Ok(Self::CommandError { id, error });
        }

        if let (Some(id), Some(result)) = (id, map.remove("result")) {
            return Ok(Self::Ack { id, result });
        }

        Ok(Self::Other)
    }
}
