//! Streaming side of the market-data layer.
//!
//! Provides the single multiplexed trade stream:
//! - Single-owner connection task with capped exponential reconnect backoff
//! - Desired/active subscription sets with full resubscribe on reconnect
//! - Liveness pings and idle timeout detection
//! - Bounded, drop-oldest trade fan-out to any number of listeners

pub mod connection;
pub mod error;
pub mod fanout;
pub mod handle;
pub mod heartbeat;
pub mod message;
pub mod subscription;

pub use connection::{ConnectionConfig, ConnectionManager, DEFAULT_STREAM_URL};
pub use error::{WsError, WsResult};
pub use fanout::{decode_trade, TradeFanout, TradeStream, DEFAULT_FANOUT_CAPACITY};
pub use handle::{ConnectionHandle, ControlCommand};
pub use heartbeat::HeartbeatMonitor;
pub use message::{CommandErrorPayload, CommandMethod, InboundFrame, StreamCommand, TradeFrame};
pub use subscription::{ConnectionState, SubscriptionState, MAX_OUTSTANDING};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the process-wide TLS crypto provider.
/// Call before opening any connection.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
