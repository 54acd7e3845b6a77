//! Trade event fan-out.
//!
//! Decoded trade events are published into a bounded broadcast buffer.
//! Publishing never waits on listeners: a listener that falls more than the
//! buffer capacity behind loses its oldest events and is told how many it
//! skipped. Listeners only see events published after they subscribed.

use crate::error::{WsError, WsResult};
use crate::message::TradeFrame;
use mktdata_core::{Instrument, TradeEvent};
use mktdata_telemetry::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-listener buffer capacity.
pub const DEFAULT_FANOUT_CAPACITY: usize = 4096;

/// Convert a wire trade frame into a trade event.
///
/// Price and quantity strings are moved over untouched.
pub fn decode_trade(frame: TradeFrame) -> WsResult<TradeEvent> {
    let instrument = Instrument::new(&frame.symbol)
        .map_err(|e| WsError::Decode(format!("trade symbol: {e}")))?;
    Ok(TradeEvent {
        instrument,
        price: frame.price,
        quantity: frame.quantity,
        event_time_ms: frame.event_time,
        trade_id: frame.trade_id,
        trade_time_ms: frame.trade_time,
        buyer_is_maker: frame.buyer_is_maker,
    })
}

struct FanoutInner {
    tx: broadcast::Sender<TradeEvent>,
    capacity: usize,
    closed: CancellationToken,
    /// Set while the slowest listener's backlog is above the warning mark.
    backlog_warned: AtomicBool,
}

/// Multi-listener trade event publisher.
#[derive(Clone)]
pub struct TradeFanout {
    inner: Arc<FanoutInner>,
}

impl TradeFanout {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(FanoutInner {
                tx,
                capacity,
                closed: CancellationToken::new(),
                backlog_warned: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new listener. It receives events published from now on.
    pub fn subscribe(&self) -> TradeStream {
        TradeStream {
            rx: self.inner.tx.subscribe(),
            closed: self.inner.closed.clone(),
        }
    }

    /// Decode a trade frame and publish it.
    pub fn publish_frame(&self, frame: TradeFrame) -> WsResult<()> {
        let event = decode_trade(frame)?;
        self.publish(event);
        Ok(())
    }

    /// Publish an event to every current listener.
    pub fn publish(&self, event: TradeEvent) {
        if self.is_closed() {
            return;
        }
        // Err only means nobody is listening right now.
        if self.inner.tx.send(event).is_ok() {
            Metrics::trade_published();
            self.check_backlog();
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Close the fan-out. Listeners return `None` from then on, including
    /// for events still buffered. Idempotent.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            info!(listeners = self.listener_count(), "Closing trade fan-out");
            self.inner.closed.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    fn check_backlog(&self) {
        let queued = self.inner.tx.len();
        let high_water = self.inner.capacity * 3 / 4;
        if queued > high_water {
            if !self.inner.backlog_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    queued,
                    capacity = self.inner.capacity,
                    "Trade listener backlog above 75% of capacity"
                );
            }
        } else if queued <= high_water / 2 && self.inner.backlog_warned.swap(false, Ordering::Relaxed) {
            debug!(queued, "Trade listener backlog recovered");
        }
    }
}

impl Default for TradeFanout {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT_CAPACITY)
    }
}

/// One listener's view of the trade feed.
pub struct TradeStream {
    rx: broadcast::Receiver<TradeEvent>,
    closed: CancellationToken,
}

impl TradeStream {
    /// Wait for the next trade event.
    ///
    /// Returns `None` once the fan-out is closed. Events lost to lag are
    /// skipped (and logged); the stream continues with the oldest retained
    /// event.
    pub async fn recv(&mut self) -> Option<TradeEvent> {
        loop {
            if self.closed.is_cancelled() {
                return None;
            }
            tokio::select! {
                biased;
                () = self.closed.cancelled() => return None,
                result = self.rx.recv() => match result {
                    Ok(event) => {
                        if self.closed.is_cancelled() {
                            return None;
                        }
                        return Some(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Trade listener lagged, events dropped");
                        Metrics::listener_lagged(skipped);
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn frame(symbol: &str, trade_id: u64, price: &str) -> TradeFrame {
        TradeFrame {
            event_type: "trade".to_string(),
            event_time: 1_700_000_000_000 + trade_id as i64,
            symbol: symbol.to_string(),
            trade_id,
            price: price.to_string(),
            quantity: "1.00000000".to_string(),
            buyer_order_id: None,
            seller_order_id: None,
            trade_time: 1_700_000_000_000,
            buyer_is_maker: false,
        }
    }

    #[test]
    fn test_decode_trade_preserves_strings() {
        let event = decode_trade(frame("ETHUSDT", 1, "2000.00000000")).unwrap();
        assert_eq!(event.instrument.as_wire(), "ethusdt");
        assert_eq!(event.price, "2000.00000000");
        assert_eq!(event.quantity, "1.00000000");
    }

    #[test]
    fn test_decode_trade_bad_symbol() {
        assert!(matches!(
            decode_trade(frame("ETH/USDT", 1, "1")),
            Err(WsError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_listener_sees_only_later_events() {
        let fanout = TradeFanout::new(16);
        let mut early = fanout.subscribe();

        fanout.publish_frame(frame("ETHUSDT", 1, "1")).unwrap();

        let mut late = fanout.subscribe();
        fanout.publish_frame(frame("BTCUSDT", 2, "2")).unwrap();

        assert_eq!(early.recv().await.unwrap().trade_id, 1);
        assert_eq!(early.recv().await.unwrap().trade_id, 2);
        assert_eq!(late.recv().await.unwrap().trade_id, 2);
        assert!(timeout(Duration::from_millis(20), late.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let fanout = TradeFanout::new(64);
        let mut stream = fanout.subscribe();
        for id in 0..10 {
            fanout.publish_frame(frame("BTCUSDT", id, "1")).unwrap();
        }
        for id in 0..10 {
            assert_eq!(stream.recv().await.unwrap().trade_id, id);
        }
    }

    #[tokio::test]
    async fn test_lagging_listener_skips_oldest() {
        let fanout = TradeFanout::new(4);
        let mut slow = fanout.subscribe();
        for id in 0..10 {
            fanout.publish_frame(frame("BTCUSDT", id, "1")).unwrap();
        }
        // Only the newest `capacity` events remain.
        assert_eq!(slow.recv().await.unwrap().trade_id, 6);
    }

    #[tokio::test]
    async fn test_close_stops_delivery_even_when_buffered() {
        let fanout = TradeFanout::new(16);
        let mut stream = fanout.subscribe();
        fanout.publish_frame(frame("BTCUSDT", 1, "1")).unwrap();

        fanout.close();
        fanout.close();
        assert!(stream.recv().await.is_none());

        fanout.publish_frame(frame("BTCUSDT", 2, "1")).unwrap();
        let mut after = fanout.subscribe();
        assert!(after.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_listener() {
        let fanout = TradeFanout::new(16);
        let mut stream = fanout.subscribe();
        let waiter = tokio::spawn(async move { stream.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        fanout.close();
        let result = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_publish_without_listeners_is_fine() {
        let fanout = TradeFanout::new(2);
        assert_eq!(fanout.listener_count(), 0);
        fanout.publish_frame(frame("BTCUSDT", 1, "1")).unwrap();
    }
}
