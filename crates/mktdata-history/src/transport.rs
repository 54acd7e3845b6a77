//! HTTP transport seam.
//!
//! The client only needs "GET path with query, give me status and body".
//! Keeping that behind a trait lets tests script responses and failures
//! without a server.

use crate::error::{HistoryError, HistoryResult};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// GET request relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Path starting with `/` (e.g., `/api/v3/klines`).
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Request/response transport.
///
/// Implementations report connection-level failures as
/// `HistoryError::Transport`; any HTTP status is a successful transport
/// result.
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: HttpRequest) -> BoxFuture<'_, HistoryResult<HttpResponse>>;
}

/// Arc wrapper for transport trait objects.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> HistoryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HistoryError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: HttpRequest) -> BoxFuture<'_, HistoryResult<HttpResponse>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, request.path);
            debug!(%url, query = ?request.query, "HTTP GET");

            let response = self
                .client
                .get(&url)
                .query(&request.query)
                .send()
                .await
                .map_err(|e| HistoryError::Transport(format!("HTTP request failed: {e}")))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HistoryError::Transport(format!("Failed to read body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Scripted transport for tests.
///
/// Replies are consumed in order; once the script runs out every request
/// fails with a transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<HistoryResult<HttpResponse>>>,
    /// Recorded requests for verification.
    requests: Mutex<Vec<HttpRequest>>,
    /// Delay applied before every reply.
    delay: Mutex<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    pub fn push(&self, reply: HistoryResult<HttpResponse>) {
        self.script.lock().push_back(reply);
    }

    pub fn push_ok(&self, body: impl Into<String>) {
        self.push(Ok(HttpResponse::ok(body)));
    }

    pub fn push_status(&self, status: u16, body: impl Into<String>) {
        self.push(Ok(HttpResponse::status(status, body)));
    }

    pub fn push_transport_error(&self, msg: &str) {
        self.push(Err(HistoryError::Transport(msg.to_string())));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, request: HttpRequest) -> BoxFuture<'_, HistoryResult<HttpResponse>> {
        Box::pin(async move {
            self.requests.lock().push(request);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(HistoryError::Transport("script exhausted".to_string())))
        })
    }
}
