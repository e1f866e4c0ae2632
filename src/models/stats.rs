//! Serializable statistics snapshots for pool, rotator, breakers and monitor.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::proxy::ProxySource;

/// Aggregate view of a proxy pool at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub name: String,
    pub size: usize,
    pub max_pool_size: usize,
    pub healthy_count: usize,
    pub unhealthy_count: usize,
    pub degraded_count: usize,
    pub unknown_count: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub overall_success_rate: f64,
    pub source_breakdown: HashMap<ProxySource, usize>,
    pub updated_at: DateTime<Utc>,
}

/// Circuit breaker state as reported to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of one circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: usize,
    /// Seconds until the next half-open probe is allowed, when open
    pub seconds_until_probe: Option<f64>,
}

/// Rotator-level aggregates: pool stats plus breaker distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatorStats {
    pub pool: PoolStats,
    pub strategy: String,
    pub breakers_closed: usize,
    pub breakers_open: usize,
    pub breakers_half_open: usize,
}

/// Health monitor status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub is_running: bool,
    pub check_interval_secs: u64,
    pub failure_threshold: u32,
    pub total_proxies: usize,
    pub healthy_proxies: usize,
    /// Per-proxy consecutive probe failures, keyed by sanitized URL
    pub failure_counts: HashMap<String, u32>,
    /// Present while running
    pub uptime_seconds: Option<f64>,
}

/// Aggregated retry executor metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMetricsSnapshot {
    pub total_requests: u64,
    pub total_attempts: u64,
    pub total_retries: u64,
    pub successes: u64,
    pub exhausted: u64,
    pub avg_attempts_per_request: f64,
    /// Attempt counts per proxy, for spotting hot endpoints
    pub attempts_by_proxy: HashMap<Uuid, u64>,
}
