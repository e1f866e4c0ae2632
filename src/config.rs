//! Environment-driven configuration.
//!
//! Every knob has a default; `CAROUSEL_*` variables override them. Numeric
//! parse failures fall back to the default rather than aborting startup.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;
use crate::error::{CarouselError, Result};
use crate::health::HealthMonitorConfig;
use crate::pool::DEFAULT_MAX_POOL_SIZE;
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Top-level configuration for building a rotator and its monitor
#[derive(Clone)]
pub struct RotatorConfig {
    /// Registered name of the rotation strategy
    pub rotation_strategy: String,
    /// Pool membership cap
    pub max_pool_size: usize,
    /// Per-proxy circuit breaker tuning
    pub breaker: CircuitBreakerConfig,
    /// Default retry policy for requests without an explicit one
    pub retry: RetryPolicy,
    /// Health monitor settings
    pub health: HealthMonitorConfig,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            rotation_strategy: "round_robin".to_string(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            health: HealthMonitorConfig::default(),
        }
    }
}

impl RotatorConfig {
    /// Load configuration from `CAROUSEL_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_pool_size = get_env_or("CAROUSEL_MAX_POOL_SIZE", &defaults.max_pool_size.to_string())
            .parse()
            .map_err(|_| {
                CarouselError::InvalidConfig("CAROUSEL_MAX_POOL_SIZE must be a number".into())
            })?;

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse_or(
                "CAROUSEL_BREAKER_FAILURE_THRESHOLD",
                defaults.breaker.failure_threshold,
            ),
            timeout_duration: Duration::from_secs(parse_or(
                "CAROUSEL_BREAKER_TIMEOUT_SECS",
                defaults.breaker.timeout_duration.as_secs(),
            )),
            window_duration: Duration::from_secs(parse_or(
                "CAROUSEL_BREAKER_WINDOW_SECS",
                defaults.breaker.window_duration.as_secs(),
            )),
        };

        let retry_timeout_secs: u64 = parse_or("CAROUSEL_RETRY_TIMEOUT_SECS", 0);
        let retry = RetryPolicy {
            max_attempts: parse_or("CAROUSEL_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts),
            backoff: match get_env_or("CAROUSEL_RETRY_BACKOFF", "exponential").as_str() {
                "linear" => BackoffStrategy::Linear,
                "fixed" => BackoffStrategy::Fixed,
                _ => BackoffStrategy::Exponential,
            },
            base_delay: Duration::from_millis(parse_or(
                "CAROUSEL_RETRY_BASE_DELAY_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )),
            multiplier: parse_or("CAROUSEL_RETRY_MULTIPLIER", defaults.retry.multiplier),
            jitter: parse_or("CAROUSEL_RETRY_JITTER", defaults.retry.jitter),
            retry_status_codes: parse_status_codes(
                "CAROUSEL_RETRY_STATUS_CODES",
                &defaults.retry.retry_status_codes,
            ),
            retry_non_idempotent: parse_or("CAROUSEL_RETRY_NON_IDEMPOTENT", false),
            timeout: (retry_timeout_secs > 0).then(|| Duration::from_secs(retry_timeout_secs)),
            intelligent_failover: parse_or("CAROUSEL_RETRY_INTELLIGENT_FAILOVER", false),
        };

        let health = HealthMonitorConfig {
            check_interval: Duration::from_secs(parse_or(
                "CAROUSEL_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health.check_interval.as_secs(),
            )),
            check_timeout: Duration::from_secs(parse_or(
                "CAROUSEL_HEALTH_CHECK_TIMEOUT_SECS",
                defaults.health.check_timeout.as_secs(),
            )),
            check_url: get_env_or("CAROUSEL_HEALTH_CHECK_URL", &defaults.health.check_url),
            failure_threshold: parse_or(
                "CAROUSEL_HEALTH_FAILURE_THRESHOLD",
                defaults.health.failure_threshold,
            ),
            max_concurrent_checks: parse_or(
                "CAROUSEL_HEALTH_MAX_CONCURRENT_CHECKS",
                defaults.health.max_concurrent_checks,
            ),
        };
        health.validate()?;

        Ok(Self {
            rotation_strategy: get_env_or(
                "CAROUSEL_ROTATION_STRATEGY",
                &defaults.rotation_strategy,
            ),
            max_pool_size,
            breaker,
            retry,
            health,
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an env var, falling back to the default on absence or parse failure
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated status codes, e.g. `"502,503,504"`
fn parse_status_codes(key: &str, default: &HashSet<u16>) -> HashSet<u16> {
    match env::var(key) {
        Ok(raw) => {
            let parsed: HashSet<u16> = raw
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if parsed.is_empty() {
                default.clone()
            } else {
                parsed
            }
        }
        Err(_) => default.clone(),
    }
}
