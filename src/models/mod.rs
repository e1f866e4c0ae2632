//! Core data models: proxy records, selection context and stats snapshots.

mod context;
mod proxy;
mod stats;

pub use context::SelectionContext;
pub use proxy::{
    HealthStatus, Proxy, ProxyBuilder, ProxyCredentials, ProxyScheme, ProxySnapshot, ProxySource,
};
pub use stats::{
    BreakerSnapshot, BreakerState, MonitorStatus, PoolStats, RetryMetricsSnapshot, RotatorStats,
};
