use crate::commands::{build_context, resolve_symbols, runtime};
use crate::services::Orchestrator;

/// One-shot ingest pass, mostly for operations and debugging. `force`
/// bypasses the pricing gate and is loudly audit-logged.
pub fn run(symbols: Vec<String>, force: bool) {
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
        if force {
            println!("⚠️  FORCE mode: pricing gate bypassed, writes are audit-logged");
        }

        let orchestrator = Orchestrator::new(
            ctx.gateway.clone(),
            ctx.db.clone(),
            ctx.cache.clone(),
            ctx.config.plan_tier.quality(),
        );
        let results = orchestrator.ingest_batch(&symbols, force).await;

        let mut failed = 0;
        for r in &results {
            if r.success {
                println!("✅ {}", r.symbol);
            } else {
                failed += 1;
                println!("❌ {}: {}", r.symbol, r.reason.as_deref().unwrap_or("unknown"));
            }
        }
        println!("\n📊 {} ok, {} failed", results.len() - failed, failed);
        i32::from(failed > 0)
    });
    std::process::exit(exit);
}
