//! mktdata - Entry Point
//!
//! Streams trades for a set of instruments, or fetches candles, the
//! instrument directory or a historical summary, printing JSON lines.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mktdata::config::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
use mktdata::{AppConfig, Interval, MarketData, PriceChangeTracker};
use serde_json::json;
use tracing::{info, warn};

/// Real-time market data access
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MKTDATA_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream trades until Ctrl-C
    Stream {
        /// Comma-separated symbols (e.g., btcusdt,ethusdt)
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        /// Stop after this many trades
        #[arg(long)]
        max_events: Option<u64>,
    },
    /// Fetch a candle series
    Candles {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1m")]
        interval: Interval,
        #[arg(long, default_value_t = 100)]
        limit: u16,
        /// Start time (ms since epoch)
        #[arg(long)]
        start: Option<i64>,
        /// End time (ms since epoch)
        #[arg(long)]
        end: Option<i64>,
    },
    /// Fetch the tradable instrument directory
    Instruments,
    /// Fetch recent, daily and weekly candles for one symbol
    Summary {
        #[arg(long)]
        symbol: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    mktdata_ws::init_crypto();

    let args = Args::parse();

    // CLI arg > MKTDATA_CONFIG env var > default path
    let config = match args.config {
        Some(path) => AppConfig::from_file(&path)?,
        None => {
            let path = std::env::var(CONFIG_ENV_VAR)
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
            AppConfig::load_or_default(&path)?
        }
    };

    mktdata_telemetry::init_logging_with_filter(&config.telemetry.log_filter)?;
    info!("Starting mktdata v{}", env!("CARGO_PKG_VERSION"));

    let market_data = MarketData::start(config)?;
    let result = run(&market_data, args.command).await;
    market_data.shutdown().await;

    if args.metrics {
        eprint!("{}", mktdata_telemetry::Metrics::gather_text()?);
    }
    result
}

async fn run(market_data: &MarketData, command: Command) -> Result<()> {
    match command {
        Command::Stream {
            symbols,
            max_events,
        } => stream(market_data, &symbols, max_events).await,
        Command::Candles {
            symbol,
            interval,
            limit,
            start,
            end,
        } => {
            let candles = market_data
                .get_candles(&symbol, interval, limit, start, end)
                .await
                .with_context(|| format!("fetching {interval} candles for {symbol}"))?;
            for candle in &candles {
                println!("{}", serde_json::to_string(candle)?);
            }
            Ok(())
        }
        Command::Instruments => {
            let instruments = market_data.get_instruments().await?;
            for instrument in &instruments {
                println!("{}", serde_json::to_string(instrument)?);
            }
            info!(count = instruments.len(), "Instrument directory fetched");
            Ok(())
        }
        Command::Summary { symbol } => {
            let summary = market_data.get_historical_summary(&symbol).await?;
            println!("{}", serde_json::to_string(&summary)?);
            Ok(())
        }
    }
}

async fn stream(market_data: &MarketData, symbols: &[String], max_events: Option<u64>) -> Result<()> {
    let mut events = market_data.trade_events();
    market_data.set_desired_symbols(symbols)?;

    let mut tracker = PriceChangeTracker::new();
    let mut seen = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Trade feed closed");
                    break;
                };
                let change_pct = tracker
                    .observe(&event)
                    .and_then(|change| change.pct)
                    .map(|pct| pct.round_dp(4).to_string());
                println!(
                    "{}",
                    json!({
                        "symbol": event.instrument.display_symbol(),
                        "price": event.price,
                        "quantity": event.quantity,
                        "trade_id": event.trade_id,
                        "event_time_ms": event.event_time_ms,
                        "change_pct": change_pct,
                    })
                );

                seen += 1;
                if max_events.is_some_and(|max| seen >= max) {
                    break;
                }
            }
        }
    }

    info!(events = seen, "Stream finished");
    Ok(())
}
