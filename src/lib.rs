//! pricefeed: equity market-data ingestion daemon.
//!
//! Polls an upstream snapshot API on a fixed interval, gates every write
//! through a pricing state machine, and propagates accepted ticks into
//! SQLite and an in-process hot cache with broadcast notifications.
//! External callers (cron, CLI, services) drive it through
//! [`services::Orchestrator::ingest_batch`] and
//! [`services::bootstrap::bootstrap_previous_closes`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod worker;
