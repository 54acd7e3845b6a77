//! Streaming connection manager.
//!
//! A single task owns the connection, the subscription state machine and the
//! reconnect loop. Callers steer it through a [`ConnectionHandle`]; inbound
//! trades go out through the [`TradeFanout`].

use crate::error::{WsError, WsResult};
use crate::fanout::{TradeFanout, DEFAULT_FANOUT_CAPACITY};
use crate::handle::{ConnectionHandle, ControlCommand};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{InboundFrame, StreamCommand};
use crate::subscription::{ConnectionState, SubscriptionState};
use futures_util::{Sink, SinkExt, StreamExt};
use mktdata_core::Backoff;
use mktdata_telemetry::Metrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default streaming endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/ws";

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Silence after which the connection is considered dead.
    pub idle_timeout_ms: u64,
    /// Per-listener trade buffer.
    pub fanout_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            reconnect_base_delay_ms: 250,
            reconnect_max_delay_ms: 5000,
            idle_timeout_ms: 60_000,
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
        }
    }
}

impl ConnectionConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::from_millis(self.reconnect_base_delay_ms, self.reconnect_max_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }
}

/// Owner of the single streaming connection.
pub struct ConnectionManager {
    config: ConnectionConfig,
    backoff: Backoff,
    subscriptions: SubscriptionState,
    heartbeat: HeartbeatMonitor,
    fanout: TradeFanout,
    /// Snapshot read by handles.
    state: Arc<RwLock<ConnectionState>>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    /// Reconnect attempts since the last successful open.
    attempt: u32,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager and the handle that controls it.
    ///
    /// Nothing happens on the network until [`run`](Self::run) is polled.
    pub fn new(config: ConnectionConfig, fanout: TradeFanout) -> (Self, ConnectionHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let shutdown_token = CancellationToken::new();
        let handle = ConnectionHandle::new(tx, state.clone(), shutdown_token.clone());

        let manager = Self {
            backoff: config.backoff(),
            heartbeat: HeartbeatMonitor::new(config.idle_timeout()),
            config,
            subscriptions: SubscriptionState::new(),
            fanout,
            state,
            commands,
            attempt: 0,
            shutdown_token,
        };
        (manager, handle)
    }

    /// Run the connection until shutdown.
    ///
    /// Connects, keeps the subscriptions in line with the desired set and
    /// reconnects after any connection-level failure. Closes the fan-out on
    /// exit.
    pub async fn run(mut self) {
        loop {
            if self.shutdown_token.is_cancelled() {
                info!("Shutdown requested, exiting connect loop");
                break;
            }

            if self.subscriptions.begin_connect() {
                self.publish_state();
            }

            match self.try_connect().await {
                Ok(()) => info!("Stream connection closed"),
                Err(e) => {
                    error!(error = %e, attempt = self.attempt, "Stream connection error");
                    Metrics::ws_reconnect(e.reason());
                }
            }

            self.subscriptions.on_disconnected();
            self.publish_state();
            Metrics::ws_active_instruments(0);

            if self.shutdown_token.is_cancelled() {
                info!("Shutdown requested after disconnect, not reconnecting");
                break;
            }

            let delay = self.backoff.delay(self.attempt);
            self.attempt = self.attempt.saturating_add(1);
            warn!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            if !self.wait_backoff(delay).await {
                info!("Shutdown requested during backoff, exiting");
                break;
            }
        }

        self.subscriptions.on_disconnected();
        self.publish_state();
        self.fanout.close();
    }

    async fn try_connect(&mut self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to stream");

        // TCP_NODELAY on; the handshake is bounded by the idle timeout.
        let handshake = tokio::time::timeout(
            self.config.idle_timeout(),
            connect_async_tls_with_config(&self.config.url, None, true, None),
        );
        let (ws_stream, _response) = tokio::select! {
            biased;
            () = self.shutdown_token.cancelled() => return Ok(()),
            result = handshake => result
                .map_err(|_| WsError::ConnectionFailed("handshake timed out".to_string()))??,
        };
        let (mut write, mut read) = ws_stream.split();

        self.attempt = 0;
        self.drain_pending_commands();
        if let Some(command) = self.subscriptions.on_open() {
            send_command(&mut write, &command).await?;
        }
        self.publish_state();
        Metrics::ws_active_instruments(self.subscriptions.active().len());
        info!(active = self.subscriptions.active().len(), "Stream connected");

        self.heartbeat.reset();
        let mut liveness = tokio::time::interval(self.heartbeat.check_interval());
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    self.subscriptions.begin_close();
                    self.publish_state();
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_frame();
                            self.handle_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_frame();
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {
                            self.heartbeat.record_frame();
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            warn!("Stream ended");
                            return Ok(());
                        }
                    }
                }

                command = self.commands.recv() => {
                    match command {
                        Some(ControlCommand::SetDesired(desired)) => {
                            for command in self.subscriptions.set_desired(desired) {
                                send_command(&mut write, &command).await?;
                            }
                            Metrics::ws_active_instruments(self.subscriptions.active().len());
                        }
                        Some(ControlCommand::Connect) => {
                            debug!("Connect requested while open, ignoring");
                        }
                        None => {
                            info!("All connection handles dropped, shutting down");
                            self.shutdown_token.cancel();
                        }
                    }
                }

                _ = liveness.tick() => {
                    if self.heartbeat.is_timed_out() {
                        let idle_ms = self.heartbeat.idle_for().as_millis() as u64;
                        return Err(WsError::IdleTimeout(idle_ms));
                    }
                    if self.heartbeat.should_send_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent liveness ping");
                    }
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Trade(frame)) => {
                if let Err(e) = self.fanout.publish_frame(frame) {
                    warn!(error = %e, "Dropping trade frame");
                    Metrics::frame_dropped();
                }
            }
            Ok(InboundFrame::Ack { id, result }) => match self.subscriptions.on_ack(id) {
                Some(method) => debug!(id, method = method.as_str(), "Command acknowledged"),
                None => debug!(id, ?result, "Acknowledgment for unknown request"),
            },
            Ok(InboundFrame::CommandError { id, error }) => {
                if let Some(id) = id {
                    self.subscriptions.on_ack(id);
                }
                warn!(?id, code = error.code, msg = %error.msg, "Stream command rejected");
            }
            Ok(InboundFrame::Other) => {
                debug!("Ignoring unrecognized frame");
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                Metrics::frame_dropped();
            }
        }
    }

    /// Wait out a reconnect delay. Returns `false` on shutdown.
    ///
    /// Desired-set changes received meanwhile are recorded; a connect
    /// request ends the wait early.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => return false,
                command = self.commands.recv() => match command {
                    Some(ControlCommand::SetDesired(desired)) => {
                        self.subscriptions.set_desired(desired);
                    }
                    Some(ControlCommand::Connect) => {
                        debug!("Connect requested, skipping backoff");
                        return true;
                    }
                    None => {
                        info!("All connection handles dropped, shutting down");
                        self.shutdown_token.cancel();
                        return false;
                    }
                },
                () = &mut sleep => return true,
            }
        }
    }

    /// Fold commands queued while not open into the desired set.
    fn drain_pending_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            if let ControlCommand::SetDesired(desired) = command {
                self.subscriptions.set_desired(desired);
            }
        }
    }

    fn publish_state(&self) {
        let state = self.subscriptions.state();
        *self.state.write() = state;
        Metrics::ws_state(state.as_str());
        debug!(%state, "Connection state");
    }
}

/// Serialize and send one subscription command.
async fn send_command<S>(write: &mut S, command: &StreamCommand) -> WsResult<()>
where
    S: Sink<Message> + Unpin,
    WsError: From<S::Error>,
{
    let text = command.to_json()?;
    write.send(Message::Text(text)).await?;
    Metrics::ws_command_sent(command.method.as_str());
    debug!(
        id = command.id,
        method = command.method.as_str(),
        params = ?command.params,
        "Sent stream command"
    );
    Ok(())
}
