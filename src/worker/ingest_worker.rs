//! Fixed-interval polling worker driving the ingest pipeline.
//!
//! The worker is a thin timer: all semantics live in the orchestrator
//! and the bootstrap, which stay unit-testable without timers. Each
//! iteration re-evaluates the pricing gate, so session transitions are
//! picked up by polling rather than edge-triggered events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::models::{MarketCalendar, EXCHANGE_TZ};
use crate::services::bootstrap;
use crate::services::database::Database;
use crate::services::gateway::MarketDataSource;
use crate::services::orchestrator::Orchestrator;

#[instrument(skip_all)]
pub async fn run<S: MarketDataSource + Send + Sync>(
    orchestrator: Orchestrator<Arc<S>>,
    source: Arc<S>,
    db: Arc<Database>,
    symbols: Vec<String>,
    poll_interval: Duration,
) {
    info!(
        symbols = symbols.len(),
        interval_secs = poll_interval.as_secs(),
        "starting ingest worker"
    );

    let calendar = MarketCalendar::default();
    let mut iteration_count = 0u64;

    loop {
        iteration_count += 1;
        let loop_start = std::time::Instant::now();
        let local_now = Utc::now().with_timezone(&EXCHANGE_TZ);
        let today = local_now.date_naive();

        // Reference closes must exist before the gate opens, otherwise
        // percent change runs on the degraded unadjusted fallback
        if calendar.is_trading_day(today)
            && bootstrap::needs_bootstrap(&db, &symbols, today).await
        {
            info!(iteration = iteration_count, date = %today, "running previous-close bootstrap");
            let outcomes =
                bootstrap::bootstrap_previous_closes(source.as_ref(), &db, &calendar, &symbols, today)
                    .await;
            let failed = outcomes.iter().filter(|o| !o.success).count();
            if failed > 0 {
                warn!(iteration = iteration_count, failed, "bootstrap left gaps, will retry next pass");
            }
        }

        let results = orchestrator.ingest_batch(&symbols, false).await;
        let ok = results.iter().filter(|r| r.success).count();

        info!(
            iteration = iteration_count,
            ok,
            failed = results.len() - ok,
            loop_duration_secs = loop_start.elapsed().as_secs_f64(),
            next_pass_secs = poll_interval.as_secs(),
            "ingest worker: iteration completed"
        );

        sleep(poll_interval).await;
    }
}
