//! Reference-price bootstrap.
//!
//! Runs once per trading day before the ingest gate opens: fetches the
//! split-adjusted daily aggregate for the prior trading day and stores it
//! as that day's previousClose. This is the value percent change is
//! computed against all day, and it deliberately overrides the unadjusted
//! prevDay close the live snapshot feed embeds, which matters across
//! stock splits.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::models::{IngestOutcome, MarketCalendar};
use crate::services::database::Database;
use crate::services::gateway::MarketDataSource;

/// Fetch and store the adjusted previous close per symbol for `as_of`.
///
/// Per-symbol failures are isolated and reported in the outcomes; the
/// loop awaits between symbols so a long run stays responsive to
/// external process control.
pub async fn bootstrap_previous_closes<S: MarketDataSource>(
    source: &S,
    db: &Database,
    calendar: &MarketCalendar,
    symbols: &[String],
    as_of: NaiveDate,
) -> Vec<IngestOutcome> {
    let prior = calendar.prior_trading_day(as_of);
    info!(
        as_of = %as_of,
        prior_trading_day = %prior,
        symbols = symbols.len(),
        "bootstrapping previous closes"
    );

    let mut outcomes = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let outcome = match source.daily_close(symbol, prior).await {
            Ok(Some(bar)) => match db.set_previous_close(symbol, as_of, bar.c).await {
                Ok(()) => IngestOutcome::ok(symbol),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "failed to store previous close");
                    IngestOutcome::failed(symbol, format!("store failed: {}", e))
                }
            },
            Ok(None) => {
                warn!(symbol = %symbol, date = %prior, "no adjusted aggregate for prior day");
                IngestOutcome::failed(symbol, "no adjusted aggregate for prior trading day")
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "aggregate fetch failed");
                IngestOutcome::failed(symbol, format!("fetch failed: {}", e))
            }
        };
        outcomes.push(outcome);
    }

    let ok = outcomes.iter().filter(|o| o.success).count();
    info!(ok, failed = outcomes.len() - ok, "previous-close bootstrap finished");
    outcomes
}

/// Companion step: store the official same-day close as regularClose at
/// the close event. No adjustment concern, it is not a prior-day
/// reference.
pub async fn record_regular_closes<S: MarketDataSource>(
    source: &S,
    db: &Database,
    symbols: &[String],
    date: NaiveDate,
) -> Vec<IngestOutcome> {
    let mut outcomes = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let outcome = match source.daily_close(symbol, date).await {
            Ok(Some(bar)) => match db.set_regular_close(symbol, date, bar.c).await {
                Ok(()) => IngestOutcome::ok(symbol),
                Err(e) => IngestOutcome::failed(symbol, format!("store failed: {}", e)),
            },
            Ok(None) => IngestOutcome::failed(symbol, "no aggregate for close date"),
            Err(e) => IngestOutcome::failed(symbol, format!("fetch failed: {}", e)),
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Whether the bootstrap still needs to run for `date`: true when any
/// symbol is missing its previousClose row.
pub async fn needs_bootstrap(db: &Database, symbols: &[String], date: NaiveDate) -> bool {
    for symbol in symbols {
        match db.get_daily_ref(symbol, date).await {
            Ok(Some(daily_ref)) if daily_ref.previous_close.is_some() => {}
            Ok(_) => return true,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "daily ref lookup failed");
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::{DailyBar, RawSnapshot};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FakeSource {
        bars: HashMap<String, DailyBar>,
        calls: AtomicUsize,
        fail_symbols: Vec<String>,
    }

    impl FakeSource {
        fn new(bars: Vec<(&str, f64)>) -> Self {
            Self {
                bars: bars
                    .into_iter()
                    .map(|(s, c)| {
                        (
                            s.to_string(),
                            DailyBar {
                                o: c,
                                h: c,
                                l: c,
                                c,
                                v: 1.0,
                                t: 0,
                            },
                        )
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
                fail_symbols: Vec::new(),
            }
        }
    }

    impl MarketDataSource for FakeSource {
        async fn snapshots(&self, _symbols: &[String]) -> Result<Vec<RawSnapshot>> {
            Ok(Vec::new())
        }

        async fn daily_close(&self, symbol: &str, _date: NaiveDate) -> Result<Option<DailyBar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_symbols.iter().any(|s| s == symbol) {
                return Err(AppError::Network("boom".to_string()));
            }
            Ok(self.bars.get(symbol).copied())
        }
    }

    fn syms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_bootstrap_stores_adjusted_close_for_prior_day() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db")).await.unwrap();
        let source = FakeSource::new(vec![("AAPL", 75.0)]);
        let cal = MarketCalendar::default();
        // Monday: prior trading day is Friday
        let monday = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();

        let outcomes =
            bootstrap_previous_closes(&source, &db, &cal, &syms(&["AAPL"]), monday).await;
        assert!(outcomes[0].success);

        let r = db.get_daily_ref("AAPL", monday).await.unwrap().unwrap();
        assert_eq!(r.previous_close, Some(75.0));
        db.close().await;
    }

    #[tokio::test]
    async fn test_bootstrap_isolates_symbol_failures() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db")).await.unwrap();
        let mut source = FakeSource::new(vec![("A", 10.0), ("C", 30.0)]);
        source.fail_symbols.push("B".to_string());
        let cal = MarketCalendar::default();
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();

        let outcomes =
            bootstrap_previous_closes(&source, &db, &cal, &syms(&["A", "B", "C"]), date).await;
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[2].success);
        db.close().await;
    }

    #[tokio::test]
    async fn test_needs_bootstrap_flips_after_run() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db")).await.unwrap();
        let source = FakeSource::new(vec![("AAPL", 75.0)]);
        let cal = MarketCalendar::default();
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let symbols = syms(&["AAPL"]);

        assert!(needs_bootstrap(&db, &symbols, date).await);
        bootstrap_previous_closes(&source, &db, &cal, &symbols, date).await;
        assert!(!needs_bootstrap(&db, &symbols, date).await);
        db.close().await;
    }
}
