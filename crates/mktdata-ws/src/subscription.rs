//! Subscription state machine.
//!
//! Owns the desired set, the active set and the connection state. Pure: every
//! transition returns the commands that must go on the wire and performs no
//! I/O, so the connection loop is the only writer and the transitions can be
//! exercised without a socket.

use crate::message::{CommandMethod, StreamCommand};
use mktdata_core::{reconcile, Instrument};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Unacknowledged commands kept per session; the oldest is forgotten beyond this.
pub const MAX_OUTSTANDING: usize = 256;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription bookkeeping for the single streaming connection.
#[derive(Debug)]
pub struct SubscriptionState {
    /// What the application wants streamed.
    desired: BTreeSet<Instrument>,
    /// What the connection believes is subscribed on the wire.
    active: BTreeSet<Instrument>,
    state: ConnectionState,
    next_id: u64,
    /// Commands sent but not yet acknowledged, by request ID.
    outstanding: BTreeMap<u64, CommandMethod>,
    /// Set once the outstanding cap is hit in the current session.
    outstanding_overflowed: bool,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self {
            desired: BTreeSet::new(),
            active: BTreeSet::new(),
            state: ConnectionState::Disconnected,
            next_id: 1,
            outstanding: BTreeMap::new(),
            outstanding_overflowed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn desired(&self) -> &BTreeSet<Instrument> {
        &self.desired
    }

    pub fn active(&self) -> &BTreeSet<Instrument> {
        &self.active
    }

    /// Number of sent commands still awaiting acknowledgment.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Start a connection attempt.
    ///
    /// Returns `false` (and changes nothing) when an attempt is already in
    /// progress or the connection is open.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => false,
            ConnectionState::Disconnected | ConnectionState::Closing => {
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// The connection is open.
    ///
    /// Any active set left from a prior session is discarded and the full
    /// desired set is subscribed in one command.
    pub fn on_open(&mut self) -> Option<StreamCommand> {
        self.state = ConnectionState::Open;
        if !self.active.is_empty() {
            debug!(stale = self.active.len(), "Clearing active set from prior session");
            self.active.clear();
        }
        if self.desired.is_empty() {
            return None;
        }

        let desired = self.desired.clone();
        let command = self.command(CommandMethod::Subscribe, &desired);
        self.active = desired;
        info!(count = self.active.len(), "Subscribing full desired set");
        Some(command)
    }

    /// Replace the desired set.
    ///
    /// When open, returns the unsubscribe command (if any) followed by the
    /// subscribe command (if any) and marks the new set active optimistically.
    /// Otherwise only the desired set changes; the next `on_open` applies it.
    pub fn set_desired(&mut self, desired: BTreeSet<Instrument>) -> Vec<StreamCommand> {
        self.desired = desired;
        if self.state != ConnectionState::Open {
            return Vec::new();
        }

        let delta = reconcile(&self.active, &self.desired);
        let mut commands = Vec::with_capacity(2);
        if !delta.to_unsubscribe.is_empty() {
            commands.push(self.command(CommandMethod::Unsubscribe, &delta.to_unsubscribe));
        }
        if !delta.to_subscribe.is_empty() {
            commands.push(self.command(CommandMethod::Subscribe, &delta.to_subscribe));
        }
        self.active = self.desired.clone();
        commands
    }

    /// Graceful close has started.
    pub fn begin_close(&mut self) {
        self.state = ConnectionState::Closing;
    }

    /// The connection is gone (error, server close or shutdown).
    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.active.clear();
        self.outstanding.clear();
        self.outstanding_overflowed = false;
    }

    /// Record an acknowledgment. Returns the acknowledged method if the ID
    /// was outstanding.
    pub fn on_ack(&mut self, id: u64) -> Option<CommandMethod> {
        self.outstanding.remove(&id)
    }

    fn command(
        &mut self,
        method: CommandMethod,
        instruments: &BTreeSet<Instrument>,
    ) -> StreamCommand {
        let id = self.next_id;
        self.next_id += 1;
        if self.outstanding.len() >= MAX_OUTSTANDING {
            if let Some((oldest, _)) = self.outstanding.pop_first() {
                if !self.outstanding_overflowed {
                    self.outstanding_overflowed = true;
                    warn!(
                        oldest,
                        cap = MAX_OUTSTANDING,
                        "Commands are not being acknowledged, forgetting oldest"
                    );
                }
            }
        }
        self.outstanding.insert(id, method);
        StreamCommand::new(method, instruments, id)
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(symbols: &[&str]) -> BTreeSet<Instrument> {
        symbols.iter().map(|s| Instrument::new(s).unwrap()).collect()
    }

    fn open_state() -> SubscriptionState {
        let mut state = SubscriptionState::new();
        assert!(state.begin_connect());
        assert!(state.on_open().is_none());
        state
    }

    #[test]
    fn test_connect_while_connecting_is_noop() {
        let mut state = SubscriptionState::new();
        assert!(state.begin_connect());
        assert!(!state.begin_connect());
        assert_eq!(state.state(), ConnectionState::Connecting);

        state.on_open();
        assert!(!state.begin_connect());
        assert_eq!(state.state(), ConnectionState::Open);
    }

    #[test]
    fn test_set_desired_when_open_sends_delta() {
        let mut state = open_state();
        let commands = state.set_desired(set(&["btcusdt", "ethusdt"]));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].method, CommandMethod::Subscribe);
        assert_eq!(commands[0].params, vec!["btcusdt@trade", "ethusdt@trade"]);
        assert_eq!(state.active(), &set(&["btcusdt", "ethusdt"]));

        let commands = state.set_desired(set(&["ethusdt", "solusdt"]));
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].method, CommandMethod::Unsubscribe);
        assert_eq!(commands[0].params, vec!["btcusdt@trade"]);
        assert_eq!(commands[1].method, CommandMethod::Subscribe);
        assert_eq!(commands[1].params, vec!["solusdt@trade"]);
        assert!(commands[0].id < commands[1].id);
    }

    #[test]
    fn test_repeated_desired_set_sends_nothing() {
        let mut state = open_state();
        assert_eq!(state.set_desired(set(&["btcusdt"])).len(), 1);
        assert!(state.set_desired(set(&["btcusdt"])).is_empty());
        assert!(state.set_desired(set(&["BTCUSDT"])).is_empty());
    }

    #[test]
    fn test_set_desired_when_disconnected_only_updates_desired() {
        let mut state = SubscriptionState::new();
        assert!(state.set_desired(set(&["btcusdt"])).is_empty());
        assert_eq!(state.desired(), &set(&["btcusdt"]));
        assert!(state.active().is_empty());

        state.begin_connect();
        assert!(state.set_desired(set(&["ethusdt"])).is_empty());
    }

    #[test]
    fn test_reconnect_resubscribes_full_set_once() {
        let mut state = open_state();
        state.set_desired(set(&["btcusdt", "ethusdt"]));

        state.on_disconnected();
        assert!(state.active().is_empty());
        assert_eq!(state.outstanding(), 0);

        // Churn while disconnected.
        assert!(state.set_desired(set(&["btcusdt"])).is_empty());
        assert!(state.set_desired(set(&["btcusdt", "solusdt"])).is_empty());
        assert!(state.set_desired(set(&["solusdt", "xrpusdt", "btcusdt"])).is_empty());
        assert!(state.set_desired(set(&["solusdt", "xrpusdt"])).is_empty());

        assert!(state.begin_connect());
        let command = state.on_open().expect("subscribe on open");
        assert_eq!(command.method, CommandMethod::Subscribe);
        assert_eq!(command.params, vec!["solusdt@trade", "xrpusdt@trade"]);
        assert_eq!(state.active(), &set(&["solusdt", "xrpusdt"]));

        // Nothing else pending after the resubscribe.
        assert!(state.set_desired(set(&["solusdt", "xrpusdt"])).is_empty());
    }

    #[test]
    fn test_on_open_clears_stale_active_set() {
        let mut state = open_state();
        state.set_desired(set(&["btcusdt"]));
        // Open again without an intervening disconnect notification.
        state.begin_close();
        state.set_desired(BTreeSet::new());
        assert!(state.begin_connect());
        assert!(state.on_open().is_none());
        assert!(state.active().is_empty());
    }

    #[test]
    fn test_empty_desired_on_open_sends_nothing() {
        let mut state = SubscriptionState::new();
        state.begin_connect();
        assert!(state.on_open().is_none());
        assert!(state.active().is_empty());
    }

    #[test]
    fn test_ack_tracking() {
        let mut state = open_state();
        let commands = state.set_desired(set(&["btcusdt"]));
        let id = commands[0].id;
        assert_eq!(state.outstanding(), 1);
        assert_eq!(state.on_ack(id), Some(CommandMethod::Subscribe));
        assert_eq!(state.on_ack(id), None);
        assert_eq!(state.outstanding(), 0);
    }

    #[test]
    fn test_outstanding_is_capped_when_acks_stop() {
        let mut state = open_state();
        let first = state.set_desired(set(&["btcusdt"]))[0].id;
        for i in 0..MAX_OUTSTANDING {
            let symbols = if i % 2 == 0 { ["ethusdt"] } else { ["btcusdt"] };
            assert_eq!(state.set_desired(set(&symbols)).len(), 2);
        }
        assert_eq!(state.outstanding(), MAX_OUTSTANDING);
        // The oldest request was forgotten; the newest are still tracked.
        assert_eq!(state.on_ack(first), None);
        assert_eq!(state.outstanding(), MAX_OUTSTANDING);

        state.on_disconnected();
        assert_eq!(state.outstanding(), 0);
    }

    #[test]
    fn test_request_ids_are_unique_across_sessions() {
        let mut state = open_state();
        let first = state.set_desired(set(&["btcusdt"]))[0].id;
        state.on_disconnected();
        state.begin_connect();
        let second = state.on_open().unwrap().id;
        assert!(second > first);
    }
}
