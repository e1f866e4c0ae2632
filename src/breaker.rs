//! Per-proxy circuit breaker.
//!
//! Classic closed/open/half-open machine driven by a sliding window of
//! failure timestamps. Each breaker has its own lock; a tripped breaker never
//! stalls the pool or any other breaker.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::models::{BreakerSnapshot, BreakerState};

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within the window required to trip the breaker
    pub failure_threshold: usize,
    /// How long OPEN lasts before a half-open probe is allowed
    pub timeout_duration: Duration,
    /// Sliding window over which failures are counted
    pub window_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_duration: Duration::from_secs(30),
            window_duration: Duration::from_secs(60),
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    next_test_time: Option<Instant>,
    probe_in_flight: bool,
}

/// One breaker guarding one proxy
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                next_test_time: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// The single admission gate.
    ///
    /// CLOSED always admits. OPEN admits exactly one caller once the open
    /// timeout has elapsed, atomically moving to HALF_OPEN with the probe slot
    /// taken; concurrent callers on the same edge observe the taken slot and
    /// are refused. HALF_OPEN refuses until the outstanding probe is recorded.
    pub fn should_attempt_request(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => match inner.next_test_time {
                Some(at) if now >= at => {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    debug!("Circuit breaker half-open, admitting probe");
                    true
                }
                _ => false,
            },
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match inner.state {
            BreakerState::Closed => {
                inner.failures.push_back(now);
                while matches!(
                    inner.failures.front(),
                    Some(t) if now.duration_since(*t) > self.config.window_duration
                ) {
                    inner.failures.pop_front();
                }

                if inner.failures.len() >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.next_test_time = Some(now + self.config.timeout_duration);
                    debug!(
                        failures = inner.failures.len(),
                        "Circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.next_test_time = Some(now + self.config.timeout_duration);
                inner.probe_in_flight = false;
                debug!("Half-open probe failed, circuit breaker re-opened");
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            debug!("Circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.next_test_time = None;
        inner.probe_in_flight = false;
    }

    /// Administrative reset to CLOSED with all counters cleared
    pub fn reset(&self) {
        self.record_success();
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let now = Instant::now();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failures.len(),
            seconds_until_probe: inner
                .next_test_time
                .filter(|_| inner.state == BreakerState::Open)
                .map(|at| at.saturating_duration_since(now).as_secs_f64()),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            timeout_duration: Duration::from_secs(30),
            window_duration: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_always_admits() {
        let cb = breaker();
        for _ in 0..10 {
            assert!(cb.should_attempt_request());
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
            assert_eq!(cb.state(), BreakerState::Closed);
        }
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.should_attempt_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_evicts_old_failures() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }

        // Old failures age out of the window; one fresh failure is not enough.
        advance(Duration::from_secs(61)).await;
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_window() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.snapshot().failure_count, 0);

        // A fresh burst is needed to trip.
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_admits_single_probe_after_timeout() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);

        advance(Duration::from_secs(29)).await;
        assert!(!cb.should_attempt_request());

        advance(Duration::from_secs(2)).await;
        // First caller wins the probe slot; the edge transition is atomic.
        assert!(cb.should_attempt_request());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.should_attempt_request());
        assert!(!cb.should_attempt_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        advance(Duration::from_secs(31)).await;
        assert!(cb.should_attempt_request());

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.should_attempt_request());
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        advance(Duration::from_secs(31)).await;
        assert!(cb.should_attempt_request());

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.should_attempt_request());

        // A fresh open period must elapse before the next probe.
        advance(Duration::from_secs(31)).await;
        assert!(cb.should_attempt_request());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_while_open_is_ignored() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        let before = cb.snapshot();
        cb.record_failure();
        let after = cb.snapshot();

        assert_eq!(after.state, BreakerState::Open);
        assert_eq!(after.failure_count, before.failure_count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);

        cb.reset();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.should_attempt_request());
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_probe_countdown() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }

        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Open);
        let remaining = snap.seconds_until_probe.unwrap();
        assert!(remaining > 29.0 && remaining <= 30.0);

        advance(Duration::from_secs(10)).await;
        let remaining = cb.snapshot().seconds_until_probe.unwrap();
        assert!(remaining > 19.0 && remaining <= 20.0);
    }
}
