//! Mock stream server for integration tests.
//!
//! A WebSocket server that can:
//! - Accept connections and count them
//! - Record received text frames per connection
//! - Acknowledge subscribe/unsubscribe commands
//! - Push text frames to every open connection
//! - Drop every open connection

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Instruction to every open connection.
#[derive(Debug, Clone)]
enum ServerAction {
    Push(String),
    Disconnect,
}

/// Text frame received by the server.
#[derive(Debug, Clone)]
pub struct Received {
    /// 1-based connection number.
    pub connection: u32,
    pub text: String,
}

impl Received {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.text).unwrap()
    }
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    actions: broadcast::Sender<ServerAction>,
    messages: Arc<Mutex<Vec<Received>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start a server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<Vec<Received>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (actions, _) = broadcast::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let actions_clone = actions.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let connection = {
                            let mut count = connections_clone.lock().await;
                            *count += 1;
                            *count
                        };
                        tokio::spawn(handle_connection(
                            stream,
                            connection,
                            messages_clone.clone(),
                            actions_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            actions,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Number of connections accepted so far.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// All received text frames, in arrival order.
    pub async fn received(&self) -> Vec<Received> {
        self.messages.lock().await.clone()
    }

    /// Received commands with the given method (e.g., "SUBSCRIBE").
    pub async fn commands(&self, method: &str) -> Vec<Received> {
        self.received()
            .await
            .into_iter()
            .filter(|r| r.json()["method"] == method)
            .collect()
    }

    /// Send a text frame to every open connection.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.actions.send(ServerAction::Push(text.into()));
    }

    /// Drop every open connection without a close handshake.
    pub fn disconnect_all(&self) {
        let _ = self.actions.send(ServerAction::Disconnect);
    }

    pub async fn shutdown(self) {
        self.disconnect_all();
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    connection: u32,
    messages: Arc<Mutex<Vec<Received>>>,
    mut actions: broadcast::Receiver<ServerAction>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        messages.lock().await.push(Received {
                            connection,
                            text: text.clone(),
                        });

                        // Acknowledge commands the way the real service does
                        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
                            if parsed.get("method").is_some() {
                                let ack = serde_json::json!({"result": null, "id": parsed["id"]});
                                let _ = write.send(Message::Text(ack.to_string())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            action = actions.recv() => {
                match action {
                    Ok(ServerAction::Push(text)) => {
                        let _ = write.send(Message::Text(text)).await;
                    }
                    Ok(ServerAction::Disconnect) | Err(_) => break,
                }
            }
        }
    }
}

/// Trade frame as the service sends it.
pub fn trade_frame(symbol: &str, trade_id: u64, price: &str) -> String {
    serde_json::json!({
        "e": "trade",
        "E": 1_700_000_000_000u64 + trade_id,
        "s": symbol,
        "t": trade_id,
        "p": price,
        "q": "0.01000000",
        "T": 1_700_000_000_000u64 + trade_id,
        "m": true,
        "M": true
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
