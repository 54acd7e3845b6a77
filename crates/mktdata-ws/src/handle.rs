//! Control handle for the streaming connection.
//!
//! The connection task owns all subscription state. Everything else talks to
//! it through this handle, which only enqueues commands and never waits on
//! the network.

use crate::error::{WsError, WsResult};
use crate::subscription::ConnectionState;
use mktdata_core::Instrument;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Command sent to the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Replace the desired set.
    SetDesired(BTreeSet<Instrument>),
    /// Connect now instead of waiting out the current backoff.
    Connect,
}

/// Cloneable, non-blocking handle to the connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ControlCommand>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown_token: CancellationToken,
}

impl ConnectionHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<ControlCommand>,
        state: Arc<RwLock<ConnectionState>>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            tx,
            state,
            shutdown_token,
        }
    }

    /// Declare the instruments that should be streamed.
    ///
    /// Returns immediately. Applied on the wire when the connection is open,
    /// otherwise on the next successful connect.
    pub fn set_desired_symbols(&self, desired: BTreeSet<Instrument>) -> WsResult<()> {
        debug!(count = desired.len(), "Queueing desired set");
        self.send(ControlCommand::SetDesired(desired))
    }

    /// Request an immediate connection attempt.
    ///
    /// No-op while connecting or open.
    pub fn connect(&self) -> WsResult<()> {
        self.send(ControlCommand::Connect)
    }

    /// Last published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Stop the connection task: abandons any backoff wait or handshake and
    /// closes an open socket.
    pub fn shutdown(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!("Connection shutdown requested");
            self.shutdown_token.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn send(&self, command: ControlCommand) -> WsResult<()> {
        if self.is_shutdown() {
            return Err(WsError::SendFailed("connection is shut down".to_string()));
        }
        self.tx
            .send(command)
            .map_err(|_| WsError::SendFailed("connection task stopped".to_string()))
    }
}
