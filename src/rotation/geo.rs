//! Geo-targeted proxy selection strategy

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    apply_ema_alpha, selectable_candidates, RotationStrategy, RoundRobinStrategy, StrategyConfig,
};
use crate::error::{CarouselError, Result};
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Prefers proxies in the caller's target country, then target region.
///
/// Country takes precedence when both hints are present. When nothing
/// matches and fallback is enabled, the secondary strategy runs over the
/// full healthy set; with fallback disabled the miss is a `PoolEmpty` error.
pub struct GeoStrategy {
    rotation_index: AtomicUsize,
    secondary: Arc<dyn RotationStrategy>,
    fallback_enabled: bool,
    config: RwLock<StrategyConfig>,
}

impl GeoStrategy {
    pub fn new() -> Self {
        Self::with_secondary(Arc::new(RoundRobinStrategy::new()), true)
    }

    pub fn with_secondary(secondary: Arc<dyn RotationStrategy>, fallback_enabled: bool) -> Self {
        Self {
            rotation_index: AtomicUsize::new(0),
            secondary,
            fallback_enabled,
            config: RwLock::new(StrategyConfig::default()),
        }
    }

    fn geo_matches(
        candidates: &[Arc<Proxy>],
        ctx: &SelectionContext,
    ) -> Vec<Arc<Proxy>> {
        if let Some(country) = &ctx.target_country {
            let matched: Vec<_> = candidates
                .iter()
                .filter(|p| p.country_code().is_some_and(|c| c.eq_ignore_ascii_case(country)))
                .cloned()
                .collect();
            if !matched.is_empty() {
                return matched;
            }
        }

        if let Some(region) = &ctx.target_region {
            return candidates
                .iter()
                .filter(|p| p.region().is_some_and(|r| r.eq_ignore_ascii_case(region)))
                .cloned()
                .collect();
        }

        Vec::new()
    }
}

impl Default for GeoStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for GeoStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let has_geo_hint = ctx
            .map(|c| c.target_country.is_some() || c.target_region.is_some())
            .unwrap_or(false);

        if !has_geo_hint {
            return self.secondary.select(pool, ctx);
        }
        let ctx = ctx.expect("geo hint implies context");

        let candidates = selectable_candidates(pool, Some(ctx))?;
        let matched = Self::geo_matches(&candidates, ctx);

        if matched.is_empty() {
            if self.fallback_enabled {
                return self.secondary.select(pool, Some(ctx));
            }
            return Err(CarouselError::PoolEmpty);
        }

        let idx = self.rotation_index.fetch_add(1, Ordering::Relaxed) % matched.len();
        let proxy = Arc::clone(&matched[idx]);

        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        self.secondary.configure(config.clone());
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "geo"
    }
}
