//! Proxy rotation strategies
//!
//! This module provides the strategy contract, the built-in selection
//! policies and the process-wide plugin registry.

mod composite;
mod geo;
mod least_used;
mod performance;
mod random;
mod registry;
mod round_robin;
mod session;
mod weighted;

pub use composite::{
    CandidateFilter, CandidateSelector, CompositeStrategy, CountryFilter, RandomPick,
    RoundRobinPick, SourceFilter, TagFilter,
};
pub use geo::GeoStrategy;
pub use least_used::LeastUsedStrategy;
pub use performance::PerformanceBasedStrategy;
pub use random::RandomStrategy;
pub use registry::{StrategyFactory, StrategyRegistry};
pub use round_robin::RoundRobinStrategy;
pub use session::SessionStrategy;
pub use weighted::WeightedStrategy;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{CarouselError, Result};
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Strategy-level settings injected via [`RotationStrategy::configure`]
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    /// When set, copied onto each proxy the strategy subsequently selects,
    /// so a strategy switch can retune smoothing without rewriting history
    pub ema_alpha: Option<f64>,
    /// Minimum observed requests before performance-based selection trusts
    /// a proxy's EMA
    pub exploration_threshold: Option<u64>,
    /// Session stickiness lifetime
    pub session_ttl: Option<Duration>,
}

/// Built-in strategy kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    Random,
    Weighted,
    LeastUsed,
    PerformanceBased,
    Session,
    Geo,
    Composite,
}

impl StrategyKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Some(Self::RoundRobin),
            "random" => Some(Self::Random),
            "weighted" => Some(Self::Weighted),
            "least_used" | "leastused" | "least-used" => Some(Self::LeastUsed),
            "performance" | "performance_based" | "performance-based" => {
                Some(Self::PerformanceBased)
            }
            "session" | "session_persistence" => Some(Self::Session),
            "geo" | "geo_targeted" => Some(Self::Geo),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::Weighted => "weighted",
            Self::LeastUsed => "least_used",
            Self::PerformanceBased => "performance",
            Self::Session => "session",
            Self::Geo => "geo",
            Self::Composite => "composite",
        }
    }
}

/// Trait for proxy selection strategies
///
/// A strategy picks one proxy per call and is told the outcome exactly once
/// per selection. Strategy-internal state is owned by the strategy and
/// guarded by its own locks.
pub trait RotationStrategy: Send + Sync {
    /// Select a proxy, honoring the selection context.
    ///
    /// On success the selected proxy's `start_request` has been called.
    /// Fails with `PoolEmpty` when no candidate survives filtering.
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>>;

    /// Record the outcome of a prior selection.
    ///
    /// Delegates to `complete_request` so every EMA update flows through the
    /// proxy's single metrics path.
    fn record_result(&self, proxy: &Proxy, success: bool, response_time_ms: f64) {
        proxy.complete_request(success, response_time_ms);
    }

    /// Inject strategy-level settings
    fn configure(&self, config: StrategyConfig);

    /// Whether the pool carries the metadata this strategy needs
    fn validate_metadata(&self, _pool: &ProxyPool) -> bool {
        true
    }

    /// Notification that a proxy left the pool
    fn on_proxy_removed(&self, _proxy_id: Uuid) {}

    /// Strategy name, as registered
    fn name(&self) -> &'static str;
}

/// Create a built-in strategy instance
pub fn create_strategy(kind: StrategyKind) -> Arc<dyn RotationStrategy> {
    match kind {
        StrategyKind::RoundRobin => Arc::new(RoundRobinStrategy::new()),
        StrategyKind::Random => Arc::new(RandomStrategy::new()),
        StrategyKind::Weighted => Arc::new(WeightedStrategy::new()),
        StrategyKind::LeastUsed => Arc::new(LeastUsedStrategy::new()),
        StrategyKind::PerformanceBased => Arc::new(PerformanceBasedStrategy::new()),
        StrategyKind::Session => Arc::new(SessionStrategy::new()),
        StrategyKind::Geo => Arc::new(GeoStrategy::new()),
        // No filters and a sequential pick: callers compose their own filter
        // chains via CompositeStrategy::new.
        StrategyKind::Composite => Arc::new(CompositeStrategy::new(
            Vec::new(),
            Box::new(RoundRobinPick::new()),
        )),
    }
}

/// Healthy candidates minus context exclusions, in pool insertion order.
///
/// Every built-in strategy filters through here so `failed_proxy_ids` and
/// `required_tags` behave identically across policies.
pub(crate) fn selectable_candidates(
    pool: &ProxyPool,
    ctx: Option<&SelectionContext>,
) -> Result<Vec<Arc<Proxy>>> {
    let mut candidates = pool.get_healthy_proxies();
    if candidates.is_empty() {
        return Err(CarouselError::PoolEmpty);
    }

    if let Some(ctx) = ctx {
        if !ctx.failed_proxy_ids.is_empty() {
            candidates.retain(|p| !ctx.failed_proxy_ids.contains(&p.id()));
        }
        if !ctx.required_tags.is_empty() {
            candidates.retain(|p| ctx.required_tags.iter().all(|t| p.tags().contains(t)));
        }
        if candidates.is_empty() {
            return Err(CarouselError::PoolEmpty);
        }
    }

    Ok(candidates)
}

/// Push a configured smoothing factor onto a freshly selected proxy
pub(crate) fn apply_ema_alpha(config: &StrategyConfig, proxy: &Proxy) {
    if let Some(alpha) = config.ema_alpha {
        proxy.set_ema_alpha(alpha);
    }
}
