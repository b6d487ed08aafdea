use crate::commands::{build_context, runtime};
use crate::services::Orchestrator;
use crate::worker;

/// Run the polling ingest worker until externally terminated.
pub fn run() {
    let rt = runtime();
    rt.block_on(async {
        let ctx = match build_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("❌ Startup failed: {}", e);
                std::process::exit(1);
            }
        };
        if ctx.config.symbols.is_empty() {
            eprintln!("❌ PRICEFEED_SYMBOLS must be set for serve mode");
            std::process::exit(1);
        }

        println!(
            "🚀 Starting pricefeed worker: {} symbols, every {}s",
            ctx.config.symbols.len(),
            ctx.config.poll_interval.as_secs()
        );

        let orchestrator = Orchestrator::new(
            ctx.gateway.clone(),
            ctx.db.clone(),
            ctx.cache.clone(),
            ctx.config.plan_tier.quality(),
        );
        worker::run_ingest_worker(
            orchestrator,
            ctx.gateway.clone(),
            ctx.db.clone(),
            ctx.config.symbols.clone(),
            ctx.config.poll_interval,
        )
        .await;
    });
}
