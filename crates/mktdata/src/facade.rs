//! Market data facade.
//!
//! The entry point collaborators use. Owns no market state itself: the
//! connection task owns the subscription sets, the fan-out owns listener
//! registrations and the history client owns its cache.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use mktdata_core::{Candle, Instrument, InstrumentMetadata, Interval};
use mktdata_history::{CandleQuery, HistoricalSummary, HistoryClient, InstrumentList};
use mktdata_ws::{ConnectionHandle, ConnectionManager, ConnectionState, TradeFanout, TradeStream};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct MarketData {
    connection: ConnectionHandle,
    fanout: TradeFanout,
    history: HistoryClient,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MarketData {
    /// Start the streaming connection and build the history client.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(config: AppConfig) -> AppResult<Self> {
        let history = HistoryClient::new(config.history.clone())?;
        Self::start_with_history(config, history)
    }

    /// Start with a caller-supplied history client.
    pub fn start_with_history(config: AppConfig, history: HistoryClient) -> AppResult<Self> {
        config.validate()?;
        mktdata_ws::init_crypto();

        let fanout = TradeFanout::new(config.stream.fanout_capacity);
        let (manager, connection) = ConnectionManager::new(config.stream.clone(), fanout.clone());
        let task = tokio::spawn(manager.run());
        info!(url = %config.stream.url, "Market data started");

        let market_data = Self {
            connection,
            fanout,
            history,
            task: Mutex::new(Some(task)),
        };
        if !config.symbols.is_empty() {
            market_data.set_desired_symbols(&config.symbols)?;
        }
        Ok(market_data)
    }

    /// Declare the full set of instruments to stream.
    ///
    /// Every symbol is validated before anything is applied. Returns
    /// immediately; wire commands are issued by the connection task.
    pub fn set_desired_symbols<I, S>(&self, symbols: I) -> AppResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let desired = symbols
            .into_iter()
            .map(|s| parse_symbol(s.as_ref()))
            .collect::<AppResult<BTreeSet<Instrument>>>()?;
        info!(count = desired.len(), "Setting desired symbols");
        self.connection.set_desired_symbols(desired)?;
        Ok(())
    }

    /// Register a trade listener. It receives events from now on.
    pub fn trade_events(&self) -> TradeStream {
        self.fanout.subscribe()
    }

    pub async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u16,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> AppResult<Vec<Candle>> {
        let query = candle_query(symbol, interval, limit, start_time, end_time)?;
        Ok(self.history.get_candles(query).await?)
    }

    /// Like [`get_candles`](Self::get_candles), bypassing any cached result.
    pub async fn refresh_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u16,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> AppResult<Vec<Candle>> {
        let query = candle_query(symbol, interval, limit, start_time, end_time)?;
        Ok(self.history.refresh_candles(query).await?)
    }

    pub async fn get_instruments(&self) -> AppResult<Vec<InstrumentMetadata>> {
        Ok(self.history.get_instruments().await?)
    }

    /// Latest instrument directory, updated on every successful fetch.
    pub fn instruments(&self) -> watch::Receiver<InstrumentList> {
        self.history.instruments()
    }

    pub async fn get_historical_summary(&self, symbol: &str) -> AppResult<HistoricalSummary> {
        let instrument = parse_symbol(symbol)?;
        Ok(self.history.get_historical_summary(instrument).await?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Skip any pending reconnect delay.
    pub fn connect(&self) -> AppResult<()> {
        self.connection.connect()?;
        Ok(())
    }

    /// Stop everything: retry timers, the reconnect loop and the socket.
    /// No trade events are delivered once this returns.
    pub async fn shutdown(&self) {
        info!("Market data shutdown requested");
        self.history.shutdown();
        self.connection.shutdown();
        self.fanout.close();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(?e, "Connection task ended abnormally");
            }
        }
        info!("Market data stopped");
    }
}

fn parse_symbol(symbol: &str) -> AppResult<Instrument> {
    Instrument::new(symbol).map_err(|_| AppError::InvalidSymbol(symbol.to_string()))
}

fn candle_query(
    symbol: &str,
    interval: Interval,
    limit: u16,
    start_time: Option<i64>,
    end_time: Option<i64>,
) -> AppResult<CandleQuery> {
    Ok(CandleQuery::new(parse_symbol(symbol)?, interval, limit).with_range(start_time, end_time))
}
