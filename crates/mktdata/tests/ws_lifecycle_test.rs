//! Stream lifecycle integration tests.
//!
//! Tests the connection lifecycle end to end:
//! - Subscription of the desired set on connect
//! - No wire traffic for an unchanged desired set
//! - Trade delivery, including after a bad frame
//! - Rejected commands leave the connection open
//! - Reconnection with a single full resubscribe
//! - Shutdown

mod integration;
use integration::common::mock_ws::{trade_frame, MockWsServer, Received};

use mktdata::{AppConfig, ConnectionState, MarketData};
use mktdata_history::{HistoryClient, HistoryConfig, MockTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn config_for(server: &MockWsServer, reconnect_base_delay_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.stream.url = server.url();
    config.stream.reconnect_base_delay_ms = reconnect_base_delay_ms;
    config.stream.reconnect_max_delay_ms = reconnect_base_delay_ms;
    config
}

fn start(config: AppConfig) -> MarketData {
    let history = HistoryClient::with_transport(
        HistoryConfig::default(),
        Arc::new(MockTransport::new()),
    );
    MarketData::start_with_history(config, history).unwrap()
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let reached = timeout(Duration::from_secs(3), async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

async fn wait_for_state(market_data: &MarketData, state: ConnectionState) {
    wait_for(&format!("state {state}"), move || async move {
        market_data.connection_state() == state
    })
    .await;
}

async fn wait_for_received(server: &MockWsServer, check: fn(&[Received]) -> bool) {
    wait_for("received frames", move || async move { check(&server.received().await) }).await;
}

async fn wait_for_subscribe(server: &MockWsServer) {
    wait_for_received(server, |all| {
        all.iter().any(|r| r.json()["method"] == "SUBSCRIBE")
    })
    .await;
}

/// The desired set is subscribed in one command once connected.
#[tokio::test]
async fn test_subscribes_desired_set_on_connect() {
    let server = MockWsServer::start().await;
    let market_data = start(config_for(&server, 100));

    market_data
        .set_desired_symbols(["ETHUSDT", "btcusdt"])
        .unwrap();

    wait_for_subscribe(&server).await;
    wait_for_state(&market_data, ConnectionState::Open).await;

    let subscribes = server.commands("SUBSCRIBE").await;
    assert_eq!(subscribes.len(), 1);
    let command = subscribes[0].json();
    assert_eq!(
        command["params"],
        serde_json::json!(["btcusdt@trade", "ethusdt@trade"])
    );
    assert!(command["id"].as_u64().is_some());

    market_data.shutdown().await;
    server.shutdown().await;
}

/// Repeating the same desired set puts nothing on the wire.
#[tokio::test]
async fn test_repeated_desired_set_is_noop() {
    let server = MockWsServer::start().await;
    let market_data = start(config_for(&server, 100));

    market_data.set_desired_symbols(["btcusdt"]).unwrap();
    wait_for_subscribe(&server).await;

    market_data.set_desired_symbols(["BTCUSDT"]).unwrap();
    market_data.set_desired_symbols(["btcusdt"]).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received().await.len(), 1);

    // A real change sends only the delta, unsubscribe first.
    market_data.set_desired_symbols(["ethusdt"]).unwrap();
    wait_for_received(&server, |all| all.len() == 3).await;
    let received = server.received().await;
    assert_eq!(received[1].json()["method"], "UNSUBSCRIBE");
    assert_eq!(received[1].json()["params"], serde_json::json!(["btcusdt@trade"]));
    assert_eq!(received[2].json()["method"], "SUBSCRIBE");
    assert_eq!(received[2].json()["params"], serde_json::json!(["ethusdt@trade"]));

    market_data.shutdown().await;
    server.shutdown().await;
}

/// Trades reach listeners registered before them, and only those.
#[tokio::test]
async fn test_trades_reach_registered_listeners() {
    let server = MockWsServer::start().await;
    let market_data = start(config_for(&server, 100));
    let mut early = market_data.trade_events();

    market_data.set_desired_symbols(["ethusdt"]).unwrap();
    wait_for_subscribe(&server).await;

    // A broken frame is dropped without losing the connection.
    server.push("{not json");
    server.push(trade_frame("ETHUSDT", 1, "2000.10000000"));

    let event = timeout(Duration::from_secs(2), early.recv())
        .await
        .expect("trade should arrive")
        .expect("feed open");
    assert_eq!(event.instrument.as_wire(), "ethusdt");
    assert_eq!(event.price, "2000.10000000");
    assert_eq!(event.trade_id, 1);

    let mut late = market_data.trade_events();
    server.push(trade_frame("ETHUSDT", 2, "2000.20000000"));

    assert_eq!(early.recv().await.unwrap().trade_id, 2);
    assert_eq!(late.recv().await.unwrap().trade_id, 2);
    assert_eq!(server.connection_count().await, 1);
    assert_eq!(market_data.connection_state(), ConnectionState::Open);

    market_data.shutdown().await;
    server.shutdown().await;
}

/// A command error from the server is logged, not treated as a failure.
#[tokio::test]
async fn test_command_error_keeps_connection_open() {
    let server = MockWsServer::start().await;
    let market_data = start(config_for(&server, 100));
    let mut events = market_data.trade_events();

    market_data.set_desired_symbols(["btcusdt"]).unwrap();
    wait_for_subscribe(&server).await;
    wait_for_state(&market_data, ConnectionState::Open).await;

    let id = server.commands("SUBSCRIBE").await[0].json()["id"].clone();
    server.push(
        serde_json::json!({"error": {"code": 2, "msg": "Invalid request"}, "id": id}).to_string(),
    );
    server.push(trade_frame("BTCUSDT", 7, "50000.00"));

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("trade after the error frame")
        .expect("feed open");
    assert_eq!(event.trade_id, 7);
    assert_eq!(market_data.connection_state(), ConnectionState::Open);
    assert_eq!(server.connection_count().await, 1);

    market_data.shutdown().await;
    server.shutdown().await;
}

/// After a drop, the latest desired set is subscribed exactly once, no
/// matter how many changes happened while disconnected.
#[tokio::test]
async fn test_reconnect_resubscribes_latest_set_once() {
    let server = MockWsServer::start().await;
    let market_data = start(config_for(&server, 300));

    market_data.set_desired_symbols(["btcusdt"]).unwrap();
    wait_for_subscribe(&server).await;
    wait_for_state(&market_data, ConnectionState::Open).await;

    server.disconnect_all();
    wait_for_state(&market_data, ConnectionState::Disconnected).await;

    market_data.set_desired_symbols(["ethusdt"]).unwrap();
    market_data
        .set_desired_symbols(["ethusdt", "solusdt", "xrpusdt"])
        .unwrap();
    market_data.set_desired_symbols(["solusdt", "ethusdt"]).unwrap();

    let srv = &server;
    wait_for("reconnect", move || async move { srv.connection_count().await == 2 }).await;
    wait_for_received(&server, |all| all.iter().any(|r| r.connection == 2)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second_session: Vec<_> = server
        .received()
        .await
        .into_iter()
        .filter(|r| r.connection == 2)
        .collect();
    assert_eq!(second_session.len(), 1);
    let command = second_session[0].json();
    assert_eq!(command["method"], "SUBSCRIBE");
    assert_eq!(
        command["params"],
        serde_json::json!(["ethusdt@trade", "solusdt@trade"])
    );

    market_data.shutdown().await;
    server.shutdown().await;
}

/// Shutdown closes the feed and stops reconnecting.
#[tokio::test]
async fn test_shutdown_stops_feed_and_reconnects() {
    let server = MockWsServer::start().await;
    let market_data = start(config_for(&server, 50));
    let mut events = market_data.trade_events();

    market_data.set_desired_symbols(["btcusdt"]).unwrap();
    wait_for_state(&market_data, ConnectionState::Open).await;

    market_data.shutdown().await;
    assert!(events.recv().await.is_none());
    assert_eq!(market_data.connection_state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count().await, 1);
    server.shutdown().await;
}
