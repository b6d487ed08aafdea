//! Batch orchestrator: one pass over a symbol list.
//!
//! Per symbol: consult the pricing state machine, and only when ingest is
//! allowed fetch, normalize, persist and mirror into the hot cache. Every
//! input symbol yields exactly one outcome; expected conditions (gate
//! denied, missing payload, stale tick) are reported, never raised. A
//! single symbol's failure cannot abort the batch.
//!
//! The entry point is pure with respect to time: the worker loop passes
//! "now" in, tests pass fixed instants.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::models::{
    detect_session, IngestOutcome, MarketCalendar, PricingDecision, Quality, RawSnapshot, Session,
    EXCHANGE_TZ,
};
use crate::services::database::{Database, UpsertResult};
use crate::services::gateway::MarketDataSource;
use crate::services::hot_cache::HotCache;
use crate::services::normalizer::normalize;
use crate::services::state_machine;

pub struct Orchestrator<S: MarketDataSource> {
    source: S,
    db: Arc<Database>,
    cache: Arc<HotCache>,
    calendar: MarketCalendar,
    quality: Quality,
}

impl<S: MarketDataSource> Orchestrator<S> {
    pub fn new(source: S, db: Arc<Database>, cache: Arc<HotCache>, quality: Quality) -> Self {
        Self {
            source,
            db,
            cache,
            calendar: MarketCalendar::default(),
            quality,
        }
    }

    /// One ingest pass at the current wall clock
    pub async fn ingest_batch(&self, symbols: &[String], force: bool) -> Vec<IngestOutcome> {
        self.ingest_batch_at(symbols, force, Utc::now().with_timezone(&EXCHANGE_TZ))
            .await
    }

    /// One ingest pass evaluated at `local_now` (exchange-local).
    pub async fn ingest_batch_at(
        &self,
        symbols: &[String],
        force: bool,
        local_now: DateTime<Tz>,
    ) -> Vec<IngestOutcome> {
        let date = local_now.date_naive();
        let mut outcomes: Vec<Option<IngestOutcome>> = vec![None; symbols.len()];
        let mut decisions: HashMap<String, PricingDecision> = HashMap::new();
        let mut allowed: Vec<String> = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            let previous_close = match self.db.get_daily_ref(symbol, date).await {
                Ok(daily_ref) => daily_ref.and_then(|r| r.previous_close),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "daily ref lookup failed");
                    None
                }
            };
            let decision = state_machine::evaluate(local_now, &self.calendar, previous_close);

            if force {
                // Administrative escape hatch: every forced symbol is
                // audit-logged, whatever the gate said
                warn!(
                    symbol = %symbol,
                    forced = true,
                    state = %decision.state,
                    gate_allows = decision.can_ingest,
                    "forced ingest bypassing pricing gate"
                );
            }

            if decision.can_ingest || force {
                decisions.insert(symbol.clone(), decision);
                allowed.push(symbol.clone());
            } else {
                debug!(symbol = %symbol, state = %decision.state, "gate denied, skipping symbol");
                outcomes[i] = Some(IngestOutcome::failed(
                    symbol,
                    format!("gate denied: {}", decision.state),
                ));
            }
        }

        if allowed.is_empty() {
            return finish(symbols, outcomes);
        }

        // One batched upstream fetch for every allowed symbol; a degraded
        // upstream scopes the loss to this pass
        let snapshots: HashMap<String, RawSnapshot> = match self.source.snapshots(&allowed).await {
            Ok(snaps) => snaps.into_iter().map(|s| (s.ticker.clone(), s)).collect(),
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed for whole pass");
                for (i, symbol) in symbols.iter().enumerate() {
                    if outcomes[i].is_none() {
                        outcomes[i] = Some(IngestOutcome::failed(
                            symbol,
                            format!("upstream unavailable: {}", e),
                        ));
                    }
                }
                return finish(symbols, outcomes);
            }
        };

        let session = storage_session(local_now);
        let at_or_after_close = local_now.time() >= NaiveTime::from_hms_opt(16, 0, 0).unwrap();

        for (i, symbol) in symbols.iter().enumerate() {
            if outcomes[i].is_some() {
                continue;
            }
            let decision = match decisions.get(symbol) {
                Some(d) => *d,
                None => continue,
            };
            outcomes[i] = Some(
                self.ingest_symbol(
                    symbol,
                    date,
                    session,
                    &decision,
                    snapshots.get(symbol),
                    at_or_after_close,
                )
                .await,
            );
        }

        let results = finish(symbols, outcomes);
        let ok = results.iter().filter(|o| o.success).count();
        info!(
            symbols = symbols.len(),
            ok,
            failed = results.len() - ok,
            session = %session,
            "ingest pass complete"
        );
        results
    }

    async fn ingest_symbol(
        &self,
        symbol: &str,
        date: chrono::NaiveDate,
        session: Session,
        decision: &PricingDecision,
        snapshot: Option<&RawSnapshot>,
        at_or_after_close: bool,
    ) -> IngestOutcome {
        let raw = match snapshot {
            Some(raw) => raw,
            None => return IngestOutcome::failed(symbol, "no snapshot returned by provider"),
        };

        let tick = match normalize(raw, decision.reference_price, self.quality) {
            Some(tick) => tick,
            None => return IngestOutcome::failed(symbol, "no usable price in snapshot"),
        };

        // Store write is authoritative; cache mirroring below is
        // best-effort
        if let Err(e) = self.db.touch_ticker(symbol, Utc::now()).await {
            return IngestOutcome::failed(symbol, format!("ticker upsert failed: {}", e));
        }
        let written = match self
            .db
            .upsert_session_price(symbol, date, session, &tick)
            .await
        {
            Ok(res) => res,
            Err(e) => {
                return IngestOutcome::failed(symbol, format!("persistence failed: {}", e));
            }
        };

        // Capture the official close once the close event has passed
        if at_or_after_close {
            if let Some(day_close) = raw.day.map(|d| d.c).filter(|c| *c > 0.0) {
                if let Err(e) = self.db.set_regular_close(symbol, date, day_close).await {
                    warn!(symbol = %symbol, error = %e, "regular close capture failed");
                }
            }
        }

        if written == UpsertResult::Written {
            let shares = match self.db.get_ticker(symbol).await {
                Ok(t) => t.and_then(|t| t.shares_outstanding),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "ticker lookup for market cap failed");
                    None
                }
            };
            self.cache
                .atomic_update_price(
                    date,
                    session,
                    symbol,
                    &tick,
                    shares,
                    decision.reference_price,
                )
                .await;
        } else {
            debug!(symbol = %symbol, "stale tick not mirrored to cache");
        }

        IngestOutcome::ok(symbol)
    }
}

/// Session under which a write at `local_now` is keyed. A forced write
/// during the overnight window lands on the after-hours row, the last
/// active session of that date.
fn storage_session(local_now: DateTime<Tz>) -> Session {
    match detect_session(local_now) {
        Session::Closed => Session::AfterHours,
        s => s,
    }
}

fn finish(symbols: &[String], outcomes: Vec<Option<IngestOutcome>>) -> Vec<IngestOutcome> {
    outcomes
        .into_iter()
        .enumerate()
        .map(|(i, o)| o.unwrap_or_else(|| IngestOutcome::failed(&symbols[i], "not processed")))
        .collect()
}
