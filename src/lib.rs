//! Carousel - Rotating Proxy Client
//!
//! A rotating HTTP/SOCKS proxy client that maintains a live pool of upstream
//! proxies, selects one per request through a pluggable rotation strategy,
//! shields the pool with per-proxy circuit breakers, retries failures against
//! alternate proxies, and continuously monitors proxy health.
//!
//! ## Features
//!
//! - Thread-safe bounded proxy pool with TTL expiry and duplicate rejection
//! - Rotation strategies: round-robin, random, weighted, least-used,
//!   performance-based, session-persistence, geo-targeted, composite
//! - Per-proxy closed/open/half-open circuit breakers
//! - Retry executor with exponential/linear/fixed backoff, jitter, total
//!   deadline, idempotency gating and intelligent failover
//! - Background health monitor with consecutive-failure eviction
//!
//! ## Example
//!
//! ```no_run
//! use carousel::{Rotator, StrategyKind};
//!
//! # async fn run() -> carousel::Result<()> {
//! let rotator = Rotator::builder()
//!     .strategy_kind(StrategyKind::RoundRobin)
//!     .build();
//! rotator.add_proxy_url("http://10.0.0.1:8080")?;
//! rotator.add_proxy_url("socks5://10.0.0.2:1080")?;
//!
//! let response = rotator.get("https://example.com/ip").await?;
//! println!("{} via {}", response.status, response.proxy_url);
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod pool;
pub mod retry;
pub mod rotation;
pub mod rotator;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use client::{ProxiedRequest, ProxiedResponse, ProxyClient, ReqwestProxyClient};
pub use config::RotatorConfig;
pub use error::{CarouselError, Result};
pub use health::{HealthMonitor, HealthMonitorConfig, HealthProbe};
pub use models::{
    BreakerSnapshot, BreakerState, HealthStatus, MonitorStatus, PoolStats, Proxy, ProxyBuilder,
    ProxyScheme, ProxySnapshot, ProxySource, RetryMetricsSnapshot, RotatorStats, SelectionContext,
};
pub use pool::ProxyPool;
pub use retry::{BackoffStrategy, RetryExecutor, RetryMetrics, RetryPolicy};
pub use rotation::{RotationStrategy, StrategyConfig, StrategyKind, StrategyRegistry};
pub use rotator::{Rotator, RotatorBuilder};
