//! Rate-limited HTTP gateway to the upstream market-data provider.
//!
//! Batched snapshot fetches and adjusted daily aggregates share one
//! retry-with-backoff wrapper and one process-wide circuit breaker, so
//! the live pipeline and the reference bootstrap degrade together when
//! the provider misbehaves.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::{DailyBar, RawSnapshot};
use crate::services::breaker::CircuitBreaker;

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Abstraction over the upstream provider so the orchestrator and
/// bootstrap are unit-testable without a network.
pub trait MarketDataSource {
    /// Batched current-state snapshots for the given symbols. Failed
    /// batches are dropped, never fatal; the result may be a subset.
    fn snapshots(
        &self,
        symbols: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<RawSnapshot>>> + Send;

    /// Split-adjusted daily aggregate for one symbol and date
    fn daily_close(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Option<DailyBar>>> + Send;
}

impl<S: MarketDataSource + Send + Sync> MarketDataSource for std::sync::Arc<S> {
    async fn snapshots(&self, symbols: &[String]) -> Result<Vec<RawSnapshot>> {
        (**self).snapshots(symbols).await
    }

    async fn daily_close(&self, symbol: &str, date: NaiveDate) -> Result<Option<DailyBar>> {
        (**self).daily_close(symbol, date).await
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(default)]
    tickers: Vec<RawSnapshot>,
}

#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Option<Vec<DailyBar>>,
}

/// HTTP gateway with batching, bounded retry/backoff and a shared
/// circuit breaker
pub struct Gateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    batch_size: usize,
    batch_delay: Duration,
    max_retries: u32,
    breaker: Arc<CircuitBreaker>,
}

impl Gateway {
    pub fn new(
        api_key: String,
        batch_size: usize,
        batch_delay: Duration,
        max_retries: u32,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            batch_size: batch_size.max(1),
            batch_delay,
            max_retries: max_retries.max(1),
            breaker,
        })
    }

    /// One logical GET with bounded retries and exponential backoff.
    /// Retryable: 429, 5xx, transport errors. Other 4xx fail fast. The
    /// breaker records one event per logical request, not per attempt.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, label: &str) -> Result<T> {
        if !self.breaker.allow_request() {
            warn!(
                label,
                cooldown_secs = self.breaker.remaining_cooldown().as_secs(),
                "circuit open, short-circuiting upstream call"
            );
            return Err(AppError::CircuitOpen);
        }

        let mut last_error = String::from("no attempts made");
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs_f64(
                    2.0_f64.powi(attempt as i32 - 1) + rand::random::<f64>(),
                )
                .min(MAX_BACKOFF);
                debug!(
                    label,
                    attempt = attempt + 1,
                    max = self.max_retries,
                    reason = %last_error,
                    backoff_secs = backoff.as_secs_f64(),
                    "retrying upstream request"
                );
                sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.json::<T>().await {
                            Ok(parsed) => {
                                self.breaker.record_success();
                                return Ok(parsed);
                            }
                            Err(e) => {
                                last_error = format!("body parse error: {}", e);
                                continue;
                            }
                        }
                    } else if status.as_u16() == 429 {
                        last_error = "rate limited (429)".to_string();
                        continue;
                    } else if status.is_server_error() {
                        last_error = format!("server error ({})", status.as_u16());
                        continue;
                    } else {
                        // Remaining 4xx are request bugs, retrying cannot help
                        self.breaker.record_failure();
                        return Err(AppError::Network(format!(
                            "{}: client error ({})",
                            label,
                            status.as_u16()
                        )));
                    }
                }
                Err(e) => {
                    last_error = format!("transport error: {}", e);
                    continue;
                }
            }
        }

        self.breaker.record_failure();
        Err(AppError::Network(format!(
            "{}: retries exhausted: {}",
            label, last_error
        )))
    }

    fn snapshot_url(&self, batch: &[String]) -> String {
        format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers?tickers={}&apiKey={}",
            self.base_url,
            batch.join(","),
            self.api_key
        )
    }

    fn aggs_url(&self, symbol: &str, date: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&apiKey={}",
            self.base_url, symbol, date, date, self.api_key
        )
    }
}

impl MarketDataSource for Gateway {
    /// Fetch snapshots in fixed-size batches with a fixed inter-batch
    /// delay. A batch that errors after retries is logged and skipped;
    /// the next scheduled pass retries it naturally.
    async fn snapshots(&self, symbols: &[String]) -> Result<Vec<RawSnapshot>> {
        let mut out = Vec::with_capacity(symbols.len());
        for (i, batch) in symbols.chunks(self.batch_size).enumerate() {
            if i > 0 {
                sleep(self.batch_delay).await;
            }
            let url = self.snapshot_url(batch);
            match self.get_json::<SnapshotResponse>(&url, "snapshot").await {
                Ok(resp) => {
                    debug!(
                        batch = i,
                        requested = batch.len(),
                        received = resp.tickers.len(),
                        "snapshot batch fetched"
                    );
                    out.extend(resp.tickers);
                }
                Err(AppError::CircuitOpen) => {
                    // Nothing more will succeed this pass
                    warn!(batch = i, "circuit open, abandoning remaining batches");
                    break;
                }
                Err(e) => {
                    warn!(batch = i, error = %e, "snapshot batch failed, skipping");
                }
            }
        }
        Ok(out)
    }

    async fn daily_close(&self, symbol: &str, date: NaiveDate) -> Result<Option<DailyBar>> {
        let url = self.aggs_url(symbol, date);
        let resp: AggsResponse = self.get_json(&url, "daily_aggs").await?;
        Ok(resp
            .results
            .and_then(|rows| rows.into_iter().next())
            .filter(|bar| bar.c > 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> Gateway {
        let breaker = Arc::new(CircuitBreaker::new(5, 1, Duration::from_secs(60)));
        Gateway::new(
            "test-key".to_string(),
            25,
            Duration::from_millis(0),
            2,
            breaker,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_url_joins_batch() {
        let g = gateway();
        let url = g.snapshot_url(&["AAPL".to_string(), "MSFT".to_string()]);
        assert!(url.contains("tickers=AAPL,MSFT"));
        assert!(url.contains("apiKey=test-key"));
    }

    #[test]
    fn test_aggs_url_is_adjusted() {
        let g = gateway();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let url = g.aggs_url("AAPL", date);
        assert!(url.contains("/range/1/day/2025-06-02/2025-06-02"));
        assert!(url.contains("adjusted=true"));
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_snapshots() {
        let breaker = Arc::new(CircuitBreaker::new(1, 1, Duration::from_secs(60)));
        breaker.record_failure();
        let g = Gateway::new(
            "k".to_string(),
            25,
            Duration::from_millis(0),
            2,
            breaker.clone(),
        )
        .unwrap();
        // No network call happens: the breaker refuses before any send
        let out = g.snapshots(&["AAPL".to_string()]).await.unwrap();
        assert!(out.is_empty());
        assert!(breaker.is_open());
    }
}
