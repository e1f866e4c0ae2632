//! Performance-based proxy selection strategy

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{apply_ema_alpha, selectable_candidates, RotationStrategy, StrategyConfig};
use crate::error::{CarouselError, Result};
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Requests a proxy must have served before its EMA is trusted
const DEFAULT_EXPLORATION_THRESHOLD: u64 = 5;

/// Picks the proxy with the lowest smoothed response time.
///
/// Proxies with fewer than `exploration_threshold` observed requests are
/// still being explored; while no candidate has enough history the strategy
/// falls back to round-robin so every proxy accumulates samples.
pub struct PerformanceBasedStrategy {
    explore_index: AtomicUsize,
    config: RwLock<StrategyConfig>,
}

impl PerformanceBasedStrategy {
    pub fn new() -> Self {
        Self {
            explore_index: AtomicUsize::new(0),
            config: RwLock::new(StrategyConfig::default()),
        }
    }

    fn exploration_threshold(&self) -> u64 {
        self.config
            .read()
            .exploration_threshold
            .unwrap_or(DEFAULT_EXPLORATION_THRESHOLD)
    }
}

impl Default for PerformanceBasedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for PerformanceBasedStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let candidates = selectable_candidates(pool, ctx)?;
        let threshold = self.exploration_threshold();

        // Lowest EMA wins among proxies with enough history; ties keep the
        // earlier-inserted proxy.
        let mut best: Option<(&Arc<Proxy>, f64)> = None;
        for candidate in &candidates {
            if candidate.total_requests() <= threshold {
                continue;
            }
            let Some(ema) = candidate.ema_response_time_ms() else {
                continue;
            };
            if best.map_or(true, |(_, best_ema)| ema < best_ema) {
                best = Some((candidate, ema));
            }
        }

        let proxy = match best {
            Some((proxy, _)) => Arc::clone(proxy),
            None => {
                // Exploration: no proxy has enough history yet.
                let idx = self.explore_index.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates
                    .get(idx)
                    .cloned()
                    .ok_or(CarouselError::PoolEmpty)?
            }
        };

        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "performance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthStatus;

    fn with_history(url: &str, requests: u64, rt_ms: f64) -> Proxy {
        let proxy = Proxy::builder(url)
            .health_status(HealthStatus::Healthy)
            .build()
            .unwrap();
        for _ in 0..requests {
            proxy.record_success(rt_ms);
        }
        proxy
    }

    #[test]
    fn test_empty_pool() {
        let pool = ProxyPool::new("test");
        let strategy = PerformanceBasedStrategy::new();
        assert!(matches!(
            strategy.select(&pool, None),
            Err(CarouselError::PoolEmpty)
        ));
    }

    #[test]
    fn test_picks_lowest_ema_when_experienced() {
        let pool = ProxyPool::new("test");
        pool.add_proxy(with_history("http://slow.example.com:8080", 10, 400.0))
            .unwrap();
        let fast = pool
            .add_proxy(with_history("http://fast.example.com:8080", 10, 50.0))
            .unwrap()
            .unwrap();

        let strategy = PerformanceBasedStrategy::new();
        assert_eq!(strategy.select(&pool, None).unwrap().id(), fast.id());
    }

    #[test]
    fn test_explores_round_robin_below_threshold() {
        let pool = ProxyPool::new("test");
        for i in 1..=3 {
            pool.add_proxy(
                Proxy::builder(&format!("http://10.0.0.{}:8080", i))
                    .health_status(HealthStatus::Healthy)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        }

        let strategy = PerformanceBasedStrategy::new();
        let picks: Vec<String> = (0..3)
            .map(|_| strategy.select(&pool, None).unwrap().url().to_string())
            .collect();

        let unique: std::collections::HashSet<&String> = picks.iter().collect();
        assert_eq!(unique.len(), 3, "exploration should visit each proxy");
    }

    #[test]
    fn test_exploration_threshold_configurable() {
        let pool = ProxyPool::new("test");
        let seasoned = pool
            .add_proxy(with_history("http://seasoned.example.com:8080", 3, 100.0))
            .unwrap()
            .unwrap();
        pool.add_proxy(
            Proxy::builder("http://fresh.example.com:8080")
                .health_status(HealthStatus::Healthy)
                .build()
                .unwrap(),
        )
        .unwrap();

        let strategy = PerformanceBasedStrategy::new();

        // Default threshold (5): three requests is still exploration.
        let first = strategy.select(&pool, None).unwrap();
        assert_eq!(first.url(), "http://seasoned.example.com:8080");
        let second = strategy.select(&pool, None).unwrap();
        assert_eq!(second.url(), "http://fresh.example.com:8080");

        // Lower the threshold; the seasoned proxy now qualifies on EMA.
        strategy.configure(StrategyConfig {
            exploration_threshold: Some(2),
            ..StrategyConfig::default()
        });
        for _ in 0..4 {
            assert_eq!(strategy.select(&pool, None).unwrap().id(), seasoned.id());
        }
    }

    #[test]
    fn test_ema_tie_breaks_by_insertion_order() {
        let pool = ProxyPool::new("test");
        let first = pool
            .add_proxy(with_history("http://10.0.0.1:8080", 10, 100.0))
            .unwrap()
            .unwrap();
        pool.add_proxy(with_history("http://10.0.0.2:8080", 10, 100.0))
            .unwrap();

        let strategy = PerformanceBasedStrategy::new();
        assert_eq!(strategy.select(&pool, None).unwrap().id(), first.id());
    }
}
