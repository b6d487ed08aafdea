//! Environment-supplied configuration, validated once at process start.
//!
//! Everything operational is overridable via `PRICEFEED_*` variables;
//! missing or malformed values fail startup with a config error instead
//! of surfacing mid-pass.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::PlanTier;

pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1200;
pub const DEFAULT_MAX_RETRIES: u32 = 4;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_BREAKER_FAILURES: u32 = 5;
pub const DEFAULT_BREAKER_TRIALS: u32 = 2;
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 120;
pub const DEFAULT_DATABASE_PATH: &str = "data/pricefeed.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream API key (required)
    pub api_key: String,
    /// Plan tier deciding the static quality tag
    pub plan_tier: PlanTier,
    /// Symbols the worker loop ingests
    pub symbols: Vec<String>,
    pub database_path: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_trial_count: u32,
    pub breaker_cooldown: Duration,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {}: {}", name, raw))),
        None => Ok(default),
    }
}

impl Config {
    /// Read and validate the full configuration from the environment
    pub fn from_env() -> Result<Self> {
        let api_key = env_var("PRICEFEED_API_KEY")
            .ok_or_else(|| AppError::Config("PRICEFEED_API_KEY is required".to_string()))?;

        let plan_tier_raw = env_var("PRICEFEED_PLAN_TIER").unwrap_or_else(|| "basic".to_string());
        let plan_tier = PlanTier::parse(&plan_tier_raw).ok_or_else(|| {
            AppError::Config(format!(
                "invalid PRICEFEED_PLAN_TIER: {} (expected basic|advanced)",
                plan_tier_raw
            ))
        })?;

        let symbols = env_var("PRICEFEED_SYMBOLS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let batch_size: usize = parse_env("PRICEFEED_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(AppError::Config(
                "PRICEFEED_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            plan_tier,
            symbols,
            database_path: env_var("PRICEFEED_DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            batch_size,
            batch_delay: Duration::from_millis(parse_env(
                "PRICEFEED_BATCH_DELAY_MS",
                DEFAULT_BATCH_DELAY_MS,
            )?),
            max_retries: parse_env("PRICEFEED_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            poll_interval: Duration::from_secs(parse_env(
                "PRICEFEED_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            breaker_failure_threshold: parse_env(
                "PRICEFEED_BREAKER_FAILURES",
                DEFAULT_BREAKER_FAILURES,
            )?,
            breaker_trial_count: parse_env("PRICEFEED_BREAKER_TRIALS", DEFAULT_BREAKER_TRIALS)?,
            breaker_cooldown: Duration::from_secs(parse_env(
                "PRICEFEED_BREAKER_COOLDOWN_SECS",
                DEFAULT_BREAKER_COOLDOWN_SECS,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        assert!(DEFAULT_BATCH_SIZE > 0);
        assert!(DEFAULT_BREAKER_TRIALS >= 1);
        assert!(DEFAULT_POLL_INTERVAL_SECS >= 1);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("PRICEFEED_TEST_NUM", "not-a-number");
        let res: Result<u32> = parse_env("PRICEFEED_TEST_NUM", 5);
        assert!(res.is_err());
        std::env::remove_var("PRICEFEED_TEST_NUM");
    }

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        std::env::remove_var("PRICEFEED_TEST_UNSET");
        let res: u32 = parse_env("PRICEFEED_TEST_UNSET", 7).unwrap();
        assert_eq!(res, 7);
    }
}
