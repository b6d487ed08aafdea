pub mod bootstrap;
pub mod ingest;
pub mod serve;
pub mod status;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::services::{CircuitBreaker, Database, Gateway, HotCache};

/// Shared wiring for every command: config, breaker, gateway, store,
/// cache. The breaker and gateway are process-wide by construction.
pub(crate) struct AppContext {
    pub config: Config,
    pub gateway: Arc<Gateway>,
    pub db: Arc<Database>,
    pub cache: Arc<HotCache>,
}

pub(crate) async fn build_context() -> Result<AppContext> {
    let config = Config::from_env()?;
    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker_failure_threshold,
        config.breaker_trial_count,
        config.breaker_cooldown,
    ));
    let gateway = Arc::new(Gateway::new(
        config.api_key.clone(),
        config.batch_size,
        config.batch_delay,
        config.max_retries,
        breaker,
    )?);
    let db = Arc::new(Database::new(config.database_path.clone().into()).await?);
    let cache = Arc::new(HotCache::new());
    Ok(AppContext {
        config,
        gateway,
        db,
        cache,
    })
}

/// Resolve the symbol list: CLI override first, then configuration
pub(crate) fn resolve_symbols(cli_symbols: &[String], config: &Config) -> Vec<String> {
    if !cli_symbols.is_empty() {
        cli_symbols.iter().map(|s| s.to_uppercase()).collect()
    } else {
        config.symbols.clone()
    }
}

pub(crate) fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime")
}
