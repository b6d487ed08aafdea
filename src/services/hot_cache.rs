//! In-process hot cache and broadcast layer.
//!
//! Mirrors the latest accepted tick per (session, symbol), derives market
//! cap and its day-over-day diff, and maintains per (date, session,
//! metric) rank indexes with cached min/max. One write-lock scope covers
//! the quote, the derived metrics and the index maintenance, so a reader
//! can never observe a partially updated price/metric pair. Accepted
//! updates are published on a `tokio::sync::broadcast` channel; the
//! fan-out consumer is out of scope here.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::{Quality, Session, Tick};

const BROADCAST_CAPACITY: usize = 1024;

/// Metric dimensions the rank indexes track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    Price,
    ChangePct,
    MarketCap,
}

/// Latest accepted quote plus metrics derived in the same update
#[derive(Debug, Clone, Serialize)]
pub struct CachedQuote {
    pub symbol: String,
    pub session: Session,
    pub price: f64,
    pub change_pct: f64,
    pub ts_micros: i64,
    pub quality: Quality,
    /// price x shares outstanding, when shares are known
    pub market_cap: Option<f64>,
    /// (price - adjusted previous close) x shares outstanding
    pub market_cap_diff: Option<f64>,
}

/// Broadcast payload for one accepted tick
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdate {
    pub date: NaiveDate,
    pub quote: CachedQuote,
}

/// f64 with a total order, usable as a BTreeSet key
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedF64(f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sorted index over one metric plus cached extremes.
///
/// Min/max are refreshed only when a new value beats the cached extreme
/// or when the displaced value held it; either way it is an O(log n)
/// end-read, never a full re-scan.
#[derive(Debug, Default)]
struct RankIndex {
    entries: BTreeSet<(OrderedF64, String)>,
    current: HashMap<String, f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl RankIndex {
    fn update(&mut self, symbol: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        let displaced = self.current.insert(symbol.to_string(), value);
        if let Some(old) = displaced {
            self.entries.remove(&(OrderedF64(old), symbol.to_string()));
        }
        self.entries.insert((OrderedF64(value), symbol.to_string()));

        let displaced_max = displaced.is_some() && displaced == self.max;
        let displaced_min = displaced.is_some() && displaced == self.min;

        match self.max {
            Some(max) if value > max => self.max = Some(value),
            Some(_) if displaced_max => {
                self.max = self.entries.iter().next_back().map(|(v, _)| v.0)
            }
            None => self.max = Some(value),
            _ => {}
        }
        match self.min {
            Some(min) if value < min => self.min = Some(value),
            Some(_) if displaced_min => self.min = self.entries.iter().next().map(|(v, _)| v.0),
            None => self.min = Some(value),
            _ => {}
        }
    }

    fn top(&self, limit: usize) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .rev()
            .take(limit)
            .map(|(v, s)| (s.clone(), v.0))
            .collect()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    quotes: HashMap<(Session, String), CachedQuote>,
    indexes: HashMap<(NaiveDate, Session, Metric), RankIndex>,
}

pub struct HotCache {
    state: RwLock<CacheState>,
    tx: broadcast::Sender<PriceUpdate>,
}

impl Default for HotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HotCache {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: RwLock::new(CacheState::default()),
            tx,
        }
    }

    /// Subscribe to accepted-tick notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.tx.subscribe()
    }

    /// Apply one accepted tick: quote entry, derived market cap and rank
    /// indexes update as a single logical unit, then the change is
    /// published. Lagging subscribers lose old messages, never block the
    /// writer.
    pub async fn atomic_update_price(
        &self,
        date: NaiveDate,
        session: Session,
        symbol: &str,
        tick: &Tick,
        shares_outstanding: Option<i64>,
        adjusted_previous_close: Option<f64>,
    ) {
        let market_cap = shares_outstanding.map(|s| tick.price * s as f64);
        let market_cap_diff = match (shares_outstanding, adjusted_previous_close) {
            (Some(s), Some(prev)) => Some((tick.price - prev) * s as f64),
            _ => None,
        };

        let quote = CachedQuote {
            symbol: symbol.to_string(),
            session,
            price: tick.price,
            change_pct: tick.change_pct,
            ts_micros: tick.ts.timestamp_micros(),
            quality: tick.quality,
            market_cap,
            market_cap_diff,
        };

        {
            let mut state = self.state.write().await;
            state
                .quotes
                .insert((session, symbol.to_string()), quote.clone());

            state
                .indexes
                .entry((date, session, Metric::Price))
                .or_default()
                .update(symbol, tick.price);
            state
                .indexes
                .entry((date, session, Metric::ChangePct))
                .or_default()
                .update(symbol, tick.change_pct);
            if let Some(cap) = market_cap {
                state
                    .indexes
                    .entry((date, session, Metric::MarketCap))
                    .or_default()
                    .update(symbol, cap);
            }
        }

        // No receivers is fine; the cache itself is still authoritative
        // for readers
        if self.tx.send(PriceUpdate { date, quote }).is_err() {
            debug!(symbol, "no broadcast subscribers");
        }
    }

    pub async fn get(&self, session: Session, symbol: &str) -> Option<CachedQuote> {
        self.state
            .read()
            .await
            .quotes
            .get(&(session, symbol.to_string()))
            .cloned()
    }

    /// Cached (min, max) for one metric, if any symbol has reported
    pub async fn min_max(
        &self,
        date: NaiveDate,
        session: Session,
        metric: Metric,
    ) -> Option<(f64, f64)> {
        let state = self.state.read().await;
        let idx = state.indexes.get(&(date, session, metric))?;
        match (idx.min, idx.max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }

    /// Top `limit` symbols by metric, descending
    pub async fn ranked(
        &self,
        date: NaiveDate,
        session: Session,
        metric: Metric,
        limit: usize,
    ) -> Vec<(String, f64)> {
        let state = self.state.read().await;
        state
            .indexes
            .get(&(date, session, metric))
            .map(|idx| idx.top(limit))
            .unwrap_or_default()
    }
}
