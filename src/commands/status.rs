use chrono::Utc;

use crate::commands::{build_context, resolve_symbols, runtime};
use crate::models::{detect_session, Session, EXCHANGE_TZ};

/// Show the pricing state and stored rows for each symbol today.
pub fn run(symbols: Vec<String>) {
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

        let local_now = Utc::now().with_timezone(&EXCHANGE_TZ);
        let today = local_now.date_naive();
        println!(
            "🕐 {} exchange-local, session: {}\n",
            local_now.format("%Y-%m-%d %H:%M:%S"),
            detect_session(local_now)
        );

        for symbol in &symbols {
            println!("── {}", symbol);
            match ctx.db.get_daily_ref(symbol, today).await {
                Ok(Some(r)) => println!(
                    "   refs: prev_close={:?} regular_close={:?}",
                    r.previous_close, r.regular_close
                ),
                Ok(None) => println!("   refs: none (bootstrap pending)"),
                Err(e) => println!("   refs: error: {}", e),
            }
            for session in [Session::PreMarket, Session::Live, Session::AfterHours] {
                match ctx.db.get_session_price(symbol, today, session).await {
                    Ok(Some(p)) => println!(
                        "   {}: {:.2} ({:+.2}%) at {} [{}]",
                        session,
                        p.last_price,
                        p.change_pct,
                        p.last_ts.format("%H:%M:%S"),
                        p.quality.as_str()
                    ),
                    Ok(None) => {}
                    Err(e) => println!("   {}: error: {}", session, e),
                }
            }
        }
        0
    });
    std::process::exit(exit);
}
