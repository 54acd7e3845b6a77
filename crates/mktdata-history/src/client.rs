//! Historical data client.
//!
//! Request/response access to candles and the instrument directory, with
//! per-call retry and a short-lived candle cache.

use crate::cache::CandleCache;
use crate::config::HistoryConfig;
use crate::directory::{decode_exchange_info, InstrumentDirectory, InstrumentList, EXCHANGE_INFO_PATH};
use crate::error::{HistoryError, HistoryResult};
use crate::kline::{decode_klines, CandleQuery};
use crate::transport::{DynHttpTransport, HttpRequest, ReqwestTransport};
use futures_util::future::BoxFuture;
use mktdata_core::{Backoff, Candle, Instrument, InstrumentMetadata, Interval};
use mktdata_telemetry::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const KLINES_ENDPOINT: &str = "klines";
const EXCHANGE_INFO_ENDPOINT: &str = "exchange_info";

/// Window of a historical summary: `(interval, limit)`.
pub const RECENT_WINDOW: (Interval, u16) = (Interval::OneMinute, 60);
pub const DAILY_WINDOW: (Interval, u16) = (Interval::FifteenMinutes, 96);
pub const WEEKLY_WINDOW: (Interval, u16) = (Interval::OneHour, 168);

/// Three lookbacks of one instrument fetched together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalSummary {
    /// Last hour at 1m.
    pub recent: Vec<Candle>,
    /// Last day at 15m.
    pub daily: Vec<Candle>,
    /// Last week at 1h.
    pub weekly: Vec<Candle>,
}

/// Retrying request executor. Cheap to clone into cached futures.
#[derive(Clone)]
struct Fetcher {
    transport: DynHttpTransport,
    backoff: Backoff,
    max_attempts: u32,
    shutdown_token: CancellationToken,
}

impl Fetcher {
    /// GET with retry; returns the body of a 2xx response.
    ///
    /// Transport failures and 5xx are retried with backoff. 4xx is a
    /// validation failure and is returned at once.
    async fn fetch(&self, endpoint: &'static str, request: HttpRequest) -> HistoryResult<String> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => return Err(HistoryError::Shutdown),
                result = self.transport.get(request.clone()) => result,
            };

            let failure = match outcome {
                Ok(response) if (200..300).contains(&response.status) => {
                    Metrics::history_request(endpoint, "success");
                    debug!(endpoint, attempt, "Request succeeded");
                    return Ok(response.body);
                }
                Ok(response) if (400..500).contains(&response.status) => {
                    let err = HistoryError::Validation(format!(
                        "HTTP {}: {}",
                        response.status, response.body
                    ));
                    Metrics::history_request(endpoint, err.outcome());
                    warn!(endpoint, status = response.status, "Request rejected");
                    return Err(err);
                }
                Ok(response) => HistoryError::Server {
                    status: response.status,
                    body: response.body,
                },
                Err(e) => e,
            };

            if !failure.is_retryable() {
                Metrics::history_request(endpoint, failure.outcome());
                return Err(failure);
            }

            if attempt >= self.max_attempts {
                let err = HistoryError::DataUnavailable {
                    attempts: attempt,
                    cause: Box::new(failure),
                };
                Metrics::history_request(endpoint, err.outcome());
                warn!(endpoint, attempts = attempt, error = %err, "Retries exhausted");
                return Err(err);
            }

            let delay = self.backoff.delay(attempt - 1);
            Metrics::history_retry(endpoint);
            warn!(
                endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Retrying request"
            );

            tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => return Err(HistoryError::Shutdown),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn candles(&self, query: CandleQuery) -> BoxFuture<'static, HistoryResult<Arc<Vec<Candle>>>> {
        let fetcher = self.clone();
        Box::pin(async move {
            let body = fetcher.fetch(KLINES_ENDPOINT, query.to_request()).await?;
            let candles = decode_klines(&body).map_err(|e| {
                Metrics::history_request(KLINES_ENDPOINT, e.outcome());
                e
            })?;
            debug!(
                instrument = %query.instrument,
                interval = %query.interval,
                count = candles.len(),
                "Fetched candles"
            );
            Ok(Arc::new(candles))
        })
    }
}

struct ClientInner {
    fetcher: Fetcher,
    cache: CandleCache,
    directory: InstrumentDirectory,
}

/// Candle and instrument directory client.
#[derive(Clone)]
pub struct HistoryClient {
    inner: Arc<ClientInner>,
}

impl HistoryClient {
    /// Client over HTTP.
    pub fn new(config: HistoryConfig) -> HistoryResult<Self> {
        let transport = ReqwestTransport::new(&config.base_url, config.request_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Client over any transport.
    pub fn with_transport(config: HistoryConfig, transport: DynHttpTransport) -> Self {
        info!(
            base_url = %config.base_url,
            max_attempts = config.max_attempts(),
            "Creating history client"
        );
        Self {
            inner: Arc::new(ClientInner {
                fetcher: Fetcher {
                    transport,
                    backoff: config.backoff(),
                    max_attempts: config.max_attempts(),
                    shutdown_token: CancellationToken::new(),
                },
                cache: CandleCache::new(config.cache_ttl(), config.cache_max_entries),
                directory: InstrumentDirectory::new(),
            }),
        }
    }

    /// Fetch candles, reusing an in-flight or fresh cached result for the
    /// same query.
    pub async fn get_candles(&self, query: CandleQuery) -> HistoryResult<Vec<Candle>> {
        query.validate()?;
        self.ensure_running()?;

        let fetcher = &self.inner.fetcher;
        let slot = self
            .inner
            .cache
            .get_or_insert_with(&query, || fetcher.candles(query.clone()));
        if slot.hit {
            Metrics::cache_hit();
        } else {
            Metrics::cache_miss();
        }
        self.resolve(&query, slot.generation, slot.future).await
    }

    /// Fetch candles with a new request, superseding any cached entry.
    pub async fn refresh_candles(&self, query: CandleQuery) -> HistoryResult<Vec<Candle>> {
        query.validate()?;
        self.ensure_running()?;

        let slot = self
            .inner
            .cache
            .replace(&query, self.inner.fetcher.candles(query.clone()));
        Metrics::cache_miss();
        self.resolve(&query, slot.generation, slot.future).await
    }

    /// Fetch the directory, publish it and return it.
    pub async fn get_instruments(&self) -> HistoryResult<Vec<InstrumentMetadata>> {
        self.ensure_running()?;
        let request = HttpRequest::new(EXCHANGE_INFO_PATH);
        let body = self
            .inner
            .fetcher
            .fetch(EXCHANGE_INFO_ENDPOINT, request)
            .await?;
        let instruments = decode_exchange_info(&body).map_err(|e| {
            Metrics::history_request(EXCHANGE_INFO_ENDPOINT, e.outcome());
            e
        })?;
        self.inner.directory.publish(instruments.clone());
        Ok(instruments)
    }

    /// Latest published directory.
    pub fn latest_instruments(&self) -> InstrumentList {
        self.inner.directory.latest()
    }

    /// Observe directory publications.
    pub fn instruments(&self) -> watch::Receiver<InstrumentList> {
        self.inner.directory.subscribe()
    }

    /// Recent, daily and weekly candles, fetched concurrently. Any failure
    /// fails the whole summary.
    pub async fn get_historical_summary(
        &self,
        instrument: Instrument,
    ) -> HistoryResult<HistoricalSummary> {
        let window = |(interval, limit): (Interval, u16)| {
            CandleQuery::new(instrument.clone(), interval, limit)
        };
        let (recent, daily, weekly) = tokio::try_join!(
            self.get_candles(window(RECENT_WINDOW)),
            self.get_candles(window(DAILY_WINDOW)),
            self.get_candles(window(WEEKLY_WINDOW)),
        )?;
        Ok(HistoricalSummary {
            recent,
            daily,
            weekly,
        })
    }

    /// Abandon retry waits and refuse new calls.
    pub fn shutdown(&self) {
        if !self.is_shutdown() {
            info!("History client shutdown requested");
            self.inner.fetcher.shutdown_token.cancel();
            self.inner.cache.clear();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.fetcher.shutdown_token.is_cancelled()
    }

    /// Number of cached candle entries.
    pub fn cached_entries(&self) -> usize {
        self.inner.cache.len()
    }

    fn ensure_running(&self) -> HistoryResult<()> {
        if self.is_shutdown() {
            return Err(HistoryError::Shutdown);
        }
        Ok(())
    }

    async fn resolve(
        &self,
        query: &CandleQuery,
        generation: u64,
        future: crate::cache::SharedCandles,
    ) -> HistoryResult<Vec<Candle>> {
        match future.await {
            Ok(candles) => Ok(candles.as_ref().clone()),
            Err(e) => {
                self.inner.cache.evict(query, generation);
                Err(e)
            }
        }
    }
}
