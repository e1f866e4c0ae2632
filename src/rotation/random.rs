//! Random proxy selection strategy

use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use super::{apply_ema_alpha, selectable_candidates, RotationStrategy, StrategyConfig};
use crate::error::{CarouselError, Result};
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Selects uniformly at random over the filtered healthy set
pub struct RandomStrategy {
    config: RwLock<StrategyConfig>,
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(StrategyConfig::default()),
        }
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for RandomStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let candidates = selectable_candidates(pool, ctx)?;

        let mut rng = rand::thread_rng();
        let proxy = candidates
            .choose(&mut rng)
            .cloned()
            .ok_or(CarouselError::PoolEmpty)?;

        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthStatus;

    fn healthy(url: &str) -> Proxy {
        Proxy::builder(url)
            .health_status(HealthStatus::Healthy)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_pool() {
        let pool = ProxyPool::new("test");
        let strategy = RandomStrategy::new();
        assert!(matches!(
            strategy.select(&pool, None),
            Err(CarouselError::PoolEmpty)
        ));
    }

    #[test]
    fn test_covers_multiple_proxies() {
        let pool = ProxyPool::new("test");
        for i in 1..=5 {
            pool.add_proxy(healthy(&format!("http://10.0.0.{}:8080", i)))
                .unwrap();
        }

        let strategy = RandomStrategy::new();
        let picks: std::collections::HashSet<String> = (0..50)
            .map(|_| strategy.select(&pool, None).unwrap().url().to_string())
            .collect();

        assert!(picks.len() >= 2);
    }

    #[test]
    fn test_only_selectable_candidates() {
        let pool = ProxyPool::new("test");
        let good = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();
        pool.add_proxy(
            Proxy::builder("http://10.0.0.2:8080")
                .health_status(HealthStatus::Unhealthy)
                .build()
                .unwrap(),
        )
        .unwrap();

        let strategy = RandomStrategy::new();
        for _ in 0..20 {
            assert_eq!(strategy.select(&pool, None).unwrap().id(), good.id());
        }
    }
}
