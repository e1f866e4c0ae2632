//! Least-used proxy selection strategy

use std::sync::Arc;

use parking_lot::RwLock;

use super::{apply_ema_alpha, selectable_candidates, RotationStrategy, StrategyConfig};
use crate::error::{CarouselError, Result};
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Selects the healthy proxy with the fewest started requests.
///
/// Ties break by insertion order, so the spread across proxies stays within
/// one request of even.
pub struct LeastUsedStrategy {
    config: RwLock<StrategyConfig>,
}

impl LeastUsedStrategy {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(StrategyConfig::default()),
        }
    }
}

impl Default for LeastUsedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for LeastUsedStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let candidates = selectable_candidates(pool, ctx)?;

        // Strict less-than keeps the first minimal candidate, preserving the
        // insertion-order tie-break.
        let mut best: Option<&Arc<Proxy>> = None;
        for candidate in &candidates {
            if best.map_or(true, |b| candidate.requests_started() < b.requests_started()) {
                best = Some(candidate);
            }
        }

        let proxy = best.cloned().ok_or(CarouselError::PoolEmpty)?;
        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "least_used"
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
        let strategy = LeastUsedStrategy::new();
        assert!(matches!(
            strategy.select(&pool, None),
            Err(CarouselError::PoolEmpty)
        ));
    }

    #[test]
    fn test_selects_minimum_started() {
        let pool = ProxyPool::new("test");
        let p1 = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();
        let p2 = pool.add_proxy(healthy("http://10.0.0.2:8080")).unwrap().unwrap();
        let p3 = pool.add_proxy(healthy("http://10.0.0.3:8080")).unwrap().unwrap();

        p1.start_request();
        p1.start_request();
        p2.start_request();
        p3.start_request();
        p3.start_request();
        p3.start_request();

        let strategy = LeastUsedStrategy::new();
        assert_eq!(strategy.select(&pool, None).unwrap().id(), p2.id());
    }

    #[test]
    fn test_tie_breaks_by_insertion_order() {
        let pool = ProxyPool::new("test");
        let p1 = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();
        pool.add_proxy(healthy("http://10.0.0.2:8080")).unwrap();

        let strategy = LeastUsedStrategy::new();
        assert_eq!(strategy.select(&pool, None).unwrap().id(), p1.id());
    }

    #[test]
    fn test_balances_within_one() {
        let pool = ProxyPool::new("test");
        for i in 1..=3 {
            pool.add_proxy(healthy(&format!("http://10.0.0.{}:8080", i)))
                .unwrap();
        }

        let strategy = LeastUsedStrategy::new();
        for _ in 0..30 {
            let proxy = strategy.select(&pool, None).unwrap();
            strategy.record_result(&proxy, true, 100.0);
        }

        let counts: Vec<u64> = pool
            .get_all_proxies()
            .iter()
            .map(|p| p.requests_started())
            .collect();
        let max = counts.iter().max().unwrap();
        let min = counts.iter().min().unwrap();
        assert!(max - min <= 1, "spread {:?} exceeds 1", counts);
    }
}
