pub mod bootstrap;
pub mod breaker;
pub mod database;
pub mod gateway;
pub mod hot_cache;
pub mod normalizer;
pub mod orchestrator;
pub mod state_machine;

pub use breaker::CircuitBreaker;
pub use database::{Database, UpsertResult};
pub use gateway::{Gateway, MarketDataSource};
pub use hot_cache::{HotCache, Metric, PriceUpdate};
pub use orchestrator::Orchestrator;
