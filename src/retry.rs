//! Retry policy, backoff computation and retry metrics.
//!
//! The policy is immutable per request; the executor owns the pure decisions
//! (backoff, deadline capping, idempotency gating, failover scoring) while
//! the rotator drives the actual attempt loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{Proxy, RetryMetricsSnapshot, SelectionContext};

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Fixed,
}

/// Immutable retry configuration for one request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first try
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Apply +/-50% uniform jitter to each delay
    pub jitter: bool,
    /// HTTP statuses that count as retryable failures
    pub retry_status_codes: HashSet<u16>,
    /// Allow retrying POST/PATCH
    pub retry_non_idempotent: bool,
    /// Total wall-clock budget across all attempts
    pub timeout: Option<Duration>,
    /// Score alternates on success rate, latency and geo match instead of
    /// re-consulting the rotation strategy
    pub intelligent_failover: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: true,
            retry_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
            retry_non_idempotent: false,
            timeout: None,
            intelligent_failover: false,
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Whether this method may be retried at all.
    ///
    /// HEAD/GET/PUT/DELETE/OPTIONS/TRACE are idempotent; POST and PATCH only
    /// retry when the policy opts in.
    pub fn allows_retry(&self, method: &Method) -> bool {
        match method.as_str() {
            "HEAD" | "GET" | "PUT" | "DELETE" | "OPTIONS" | "TRACE" => true,
            _ => self.retry_non_idempotent,
        }
    }

    /// Raw delay before the attempt following failed attempt `attempt`
    /// (1-based), before jitter and deadline capping
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let secs = match self.backoff {
            BackoffStrategy::Exponential => base * self.multiplier.powi(attempt as i32 - 1),
            BackoffStrategy::Linear => base * attempt as f64,
            BackoffStrategy::Fixed => base,
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// One attempt outcome, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    Success,
    ConnectionError,
    Timeout,
    HttpStatus,
}

#[derive(Default)]
struct MetricsInner {
    total_requests: u64,
    total_attempts: u64,
    total_retries: u64,
    successes: u64,
    exhausted: u64,
    attempts_by_proxy: HashMap<Uuid, u64>,
}

/// Aggregated counters for the retry plane
#[derive(Default)]
pub struct RetryMetrics {
    inner: Mutex<MetricsInner>,
}

impl RetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, proxy_id: Uuid, attempt: u32, _outcome: RetryOutcome) {
        let mut inner = self.inner.lock();
        inner.total_attempts += 1;
        if attempt > 1 {
            inner.total_retries += 1;
        }
        *inner.attempts_by_proxy.entry(proxy_id).or_insert(0) += 1;
    }

    pub fn record_request_outcome(&self, success: bool) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        if success {
            inner.successes += 1;
        } else {
            inner.exhausted += 1;
        }
    }

    pub fn snapshot(&self) -> RetryMetricsSnapshot {
        let inner = self.inner.lock();
        let avg = if inner.total_requests == 0 {
            0.0
        } else {
            inner.total_attempts as f64 / inner.total_requests as f64
        };
        RetryMetricsSnapshot {
            total_requests: inner.total_requests,
            total_attempts: inner.total_attempts,
            total_retries: inner.total_retries,
            successes: inner.successes,
            exhausted: inner.exhausted,
            avg_attempts_per_request: avg,
            attempts_by_proxy: inner.attempts_by_proxy.clone(),
        }
    }
}

/// Weight of the geo-match bonus in the failover score
const GEO_BONUS_WEIGHT: f64 = 0.1;
/// Neutral score for proxies with no history
const NEUTRAL_SCORE: f64 = 0.5;

/// Pure retry decisions plus the metrics sink
pub struct RetryExecutor {
    metrics: Arc<RetryMetrics>,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RetryMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<RetryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Delay to sleep after failed attempt `attempt`, jittered and capped so
    /// the deadline is never overslept. `None` means the deadline has already
    /// passed or leaves no room.
    pub fn delay_before_next(
        &self,
        policy: &RetryPolicy,
        attempt: u32,
        deadline: Option<Instant>,
    ) -> Option<Duration> {
        let mut delay = policy.raw_delay(attempt);

        if policy.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.5);
            delay = Duration::from_secs_f64(delay.as_secs_f64() * factor);
        }

        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            delay = delay.min(remaining);
        }
        Some(delay)
    }

    /// Score a candidate for intelligent failover.
    ///
    /// Success rate dominates, smoothed latency refines, and a matching
    /// region earns a 10% bonus. Unseen proxies score a flat neutral 0.5 so
    /// they are neither favored nor starved.
    pub fn calculate_proxy_score(&self, proxy: &Proxy, ctx: Option<&SelectionContext>) -> f64 {
        if proxy.total_requests() == 0 {
            return NEUTRAL_SCORE;
        }

        let latency_score = match proxy.ema_response_time_ms() {
            Some(ema) => 1.0 / (1.0 + ema / 1000.0),
            None => 0.5,
        };

        let geo_bonus = match (ctx.and_then(|c| c.target_region.as_deref()), proxy.region()) {
            (Some(target), Some(region)) if target.eq_ignore_ascii_case(region) => 1.0,
            _ => 0.0,
        };

        0.6 * proxy.success_rate() + 0.3 * latency_score + GEO_BONUS_WEIGHT * geo_bonus
    }

    /// Pick the best-scoring candidate not yet tried in this sequence
    pub fn select_retry_proxy(
        &self,
        candidates: &[Arc<Proxy>],
        ctx: Option<&SelectionContext>,
    ) -> Option<Arc<Proxy>> {
        let mut best: Option<(&Arc<Proxy>, f64)> = None;
        for candidate in candidates {
            if ctx.is_some_and(|c| c.is_excluded(candidate.id())) {
                continue;
            }
            let score = self.calculate_proxy_score(candidate, ctx);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((candidate, score));
            }
        }
        best.map(|(proxy, _)| Arc::clone(proxy))
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
