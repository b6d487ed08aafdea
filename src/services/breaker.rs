//! Circuit breaker isolating the upstream market-data provider.
//!
//! Process-wide and injectable: the gateway and the reference bootstrap
//! share one instance, and tests instantiate their own. All state lives
//! behind a single mutex so two concurrent batches cannot double-trip or
//! double-reset the failure counter.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    /// Normal operation, counting consecutive failures
    Closed,
    /// Tripped; all requests refused until cooldown expires
    Open { opened_at: Instant },
    /// Cooldown expired; a bounded number of trial requests may probe
    /// the upstream before the breaker fully closes
    HalfOpen { trials_started: u32 },
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
}

/// Failure-isolation for a flaky or rate-limiting provider.
///
/// Opens after `failure_threshold` consecutive failures, refuses calls
/// for `cooldown`, then lets up to `trial_limit` half-open probes
/// through. Any success closes the breaker and resets the counter.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    trial_limit: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, trial_limit: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            failure_threshold: failure_threshold.max(1),
            trial_limit: trial_limit.max(1),
            cooldown,
        }
    }

    /// Whether a request may go out right now. Half-open probes are
    /// counted here, so callers must pair every `true` with a later
    /// `record_success` or `record_failure`.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    info!("circuit breaker cooldown expired, entering half-open");
                    inner.state = BreakerState::HalfOpen { trials_started: 1 };
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen { trials_started } => {
                if trials_started < self.trial_limit {
                    inner.state = BreakerState::HalfOpen {
                        trials_started: trials_started + 1,
                    };
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request: close the breaker, reset the counter.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Closed {
            info!("circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
    }

    /// Record a failed request. Trips the breaker after the threshold is
    /// reached; a half-open probe failure re-opens immediately.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen { .. } => {
                warn!("half-open probe failed, re-opening circuit breaker");
                inner.state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
            }
            BreakerState::Open { .. } => {}
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "circuit breaker tripped"
                    );
                    inner.state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
        }
    }

    /// True when calls are currently short-circuited
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Open { opened_at } => opened_at.elapsed() < self.cooldown,
            _ => false,
        }
    }

    /// Remaining cooldown, zero unless open
    pub fn remaining_cooldown(&self) -> Duration {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Open { opened_at } => self.cooldown.saturating_sub(opened_at.elapsed()),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new(3, 1, Duration::from_secs(60));
        assert!(cb.allow_request());
        assert!(!cb.is_open());
    }

    #[test]
    fn test_trips_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, 1, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow_request()); // 2 < 3
        cb.record_failure();
        assert!(!cb.allow_request());
        assert!(cb.is_open());
    }

    #[test]
    fn test_success_resets_counter() {
        let cb = CircuitBreaker::new(3, 1, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.allow_request()); // counter restarted
    }

    #[test]
    fn test_half_open_trial_budget() {
        let cb = CircuitBreaker::new(1, 2, Duration::from_millis(5));
        cb.record_failure();
        assert!(!cb.allow_request());
        std::thread::sleep(Duration::from_millis(10));
        // Cooldown expired: exactly `trial_limit` probes allowed
        assert!(cb.allow_request());
        assert!(cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_probe_success_closes() {
        let cb = CircuitBreaker::new(1, 1, Duration::from_millis(5));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cb.allow_request());
        cb.record_success();
        // Fully closed again, unlimited requests
        assert!(cb.allow_request());
        assert!(cb.allow_request());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let cb = CircuitBreaker::new(1, 1, Duration::from_millis(50));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.allow_request());
        cb.record_failure();
        assert!(cb.is_open());
        assert!(!cb.allow_request());
    }
}
