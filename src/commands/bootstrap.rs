use chrono::{NaiveDate, Utc};

use crate::commands::{build_context, resolve_symbols, runtime};
use crate::models::{MarketCalendar, EXCHANGE_TZ};
use crate::services::bootstrap;

/// Fetch and store split-adjusted previous closes for a trading day
/// (default: today, exchange-local). With `close`, also record the
/// official regular close for that day.
pub fn run(symbols: Vec<String>, date: Option<String>, close: bool) {
    let rt = runtime();
    let exit = rt.block_on(async {
        let ctx = match build_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("❌ Startup failed: {}", e);
                return 1;
            }
        };
        let symbols = resolve_symbols(&symbols, &ctx.config);
        if symbols.is_empty() {
            eprintln!("❌ No symbols given (pass them or set PRICEFEED_SYMBOLS)");
            return 1;
        }

        let as_of: NaiveDate = match date {
            Some(raw) => match raw.parse() {
                Ok(d) => d,
                Err(_) => {
                    eprintln!("❌ Invalid date: {} (expected YYYY-MM-DD)", raw);
                    return 1;
                }
            },
            None => Utc::now().with_timezone(&EXCHANGE_TZ).date_naive(),
        };

        let calendar = MarketCalendar::default();
        println!("📅 Bootstrapping previous closes for {} ({} symbols)", as_of, symbols.len());
        let outcomes = bootstrap::bootstrap_previous_closes(
            ctx.gateway.as_ref(),
            &ctx.db,
            &calendar,
            &symbols,
            as_of,
        )
        .await;
        let mut failed = report(&outcomes);

        if close {
            println!("🔔 Recording regular closes for {}", as_of);
            let outcomes =
                bootstrap::record_regular_closes(ctx.gateway.as_ref(), &ctx.db, &symbols, as_of)
                    .await;
            failed += report(&outcomes);
        }

        i32::from(failed > 0)
    });
    std::process::exit(exit);
}

fn report(outcomes: &[crate::models::IngestOutcome]) -> usize {
    let mut failed = 0;
    for o in outcomes {
        if o.success {
            println!("✅ {}", o.symbol);
        } else {
            failed += 1;
            println!("❌ {}: {}", o.symbol, o.reason.as_deref().unwrap_or("unknown"));
        }
    }
    failed
}
