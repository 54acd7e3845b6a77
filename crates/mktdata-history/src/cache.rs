//! Candle request cache.
//!
//! Each entry holds the shared future of one request. Callers asking for the
//! same query while it is in flight await the same future; a successful
//! result is reused until it ages past the TTL. Failed results are evicted
//! so the next caller tries again.

use crate::error::HistoryResult;
use crate::kline::CandleQuery;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use mktdata_core::Candle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Pending or completed candle request.
pub type SharedCandles = Shared<BoxFuture<'static, HistoryResult<Arc<Vec<Candle>>>>>;

#[derive(Clone)]
struct CacheEntry {
    future: SharedCandles,
    created: Instant,
    generation: u64,
}

impl CacheEntry {
    /// Pending, or resolved successfully within the TTL.
    fn is_usable(&self, ttl: Duration) -> bool {
        match self.future.peek() {
            None => true,
            Some(Ok(_)) => self.created.elapsed() < ttl,
            Some(Err(_)) => false,
        }
    }
}

/// Cache lookup result.
pub struct CacheSlot {
    pub future: SharedCandles,
    /// Identifies the entry for later eviction.
    pub generation: u64,
    /// True when an existing entry was reused.
    pub hit: bool,
}

pub struct CandleCache {
    entries: DashMap<CandleQuery, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    next_generation: AtomicU64,
}

impl CandleCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Reuse a usable entry for `query`, or install the future built by
    /// `fetch`. `fetch` runs only on a miss.
    pub fn get_or_insert_with<F>(&self, query: &CandleQuery, fetch: F) -> CacheSlot
    where
        F: FnOnce() -> BoxFuture<'static, HistoryResult<Arc<Vec<Candle>>>>,
    {
        let slot = match self.entries.entry(query.clone()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_usable(self.ttl) => {
                let entry = self.new_entry(fetch());
                let slot = CacheSlot {
                    future: entry.future.clone(),
                    generation: entry.generation,
                    hit: false,
                };
                occupied.insert(entry);
                slot
            }
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                CacheSlot {
                    future: entry.future.clone(),
                    generation: entry.generation,
                    hit: true,
                }
            }
            Entry::Vacant(vacant) => {
                let entry = self.new_entry(fetch());
                let slot = CacheSlot {
                    future: entry.future.clone(),
                    generation: entry.generation,
                    hit: false,
                };
                vacant.insert(entry);
                slot
            }
        };

        if !slot.hit {
            self.enforce_capacity();
        }
        slot
    }

    /// Install a fresh request for `query`, superseding any existing entry.
    pub fn replace(
        &self,
        query: &CandleQuery,
        future: BoxFuture<'static, HistoryResult<Arc<Vec<Candle>>>>,
    ) -> CacheSlot {
        let entry = self.new_entry(future);
        let slot = CacheSlot {
            future: entry.future.clone(),
            generation: entry.generation,
            hit: false,
        };
        self.entries.insert(query.clone(), entry);
        self.enforce_capacity();
        slot
    }

    /// Remove the entry for `query` if it still belongs to `generation`.
    ///
    /// A newer entry installed meanwhile is left alone.
    pub fn evict(&self, query: &CandleQuery, generation: u64) -> bool {
        self.entries
            .remove_if(query, |_, entry| entry.generation == generation)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn new_entry(&self, future: BoxFuture<'static, HistoryResult<Arc<Vec<Candle>>>>) -> CacheEntry {
        CacheEntry {
            future: future.shared(),
            created: Instant::now(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Drop expired entries, then the oldest ones, until under the cap.
    fn enforce_capacity(&self) {
        if self.entries.len() <= self.max_entries {
            return;
        }

        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.is_usable(ttl));

        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().created)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
        debug!(entries = self.entries.len(), "Candle cache trimmed");
    }
}
