//! Round-robin proxy selection strategy

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{apply_ema_alpha, selectable_candidates, RotationStrategy, StrategyConfig};
use crate::error::Result;
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Selects healthy proxies in sequential order with wraparound.
///
/// Deterministic over a stable pool snapshot: N healthy proxies yield N
/// distinct selections before the pattern repeats.
pub struct RoundRobinStrategy {
    index: AtomicUsize,
    config: RwLock<StrategyConfig>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
            config: RwLock::new(StrategyConfig::default()),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for RoundRobinStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let candidates = selectable_candidates(pool, ctx)?;

        let idx = self.index.fetch_add(1, Ordering::Relaxed) % candidates.len();
        let proxy = Arc::clone(&candidates[idx]);

        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CarouselError;
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
        let strategy = RoundRobinStrategy::new();
        assert!(matches!(
            strategy.select(&pool, None),
            Err(CarouselError::PoolEmpty)
        ));
    }

    #[test]
    fn test_sequential_order_with_wraparound() {
        let pool = ProxyPool::new("test");
        for i in 1..=3 {
            pool.add_proxy(healthy(&format!("http://10.0.0.{}:8080", i)))
                .unwrap();
        }

        let strategy = RoundRobinStrategy::new();
        let picks: Vec<String> = (0..6)
            .map(|_| strategy.select(&pool, None).unwrap().url().to_string())
            .collect();

        assert_eq!(picks[0], "http://10.0.0.1:8080");
        assert_eq!(picks[1], "http://10.0.0.2:8080");
        assert_eq!(picks[2], "http://10.0.0.3:8080");
        assert_eq!(&picks[..3], &picks[3..]);
    }

    #[test]
    fn test_fairness_over_window() {
        let pool = ProxyPool::new("test");
        for i in 1..=4 {
            pool.add_proxy(healthy(&format!("http://10.0.0.{}:8080", i)))
                .unwrap();
        }

        let strategy = RoundRobinStrategy::new();
        for _ in 0..3 * 4 {
            strategy.select(&pool, None).unwrap();
        }

        // Any window of k*N selections contains each proxy exactly k times.
        for proxy in pool.get_all_proxies() {
            assert_eq!(proxy.requests_started(), 3);
        }
    }

    #[test]
    fn test_skips_unhealthy() {
        let pool = ProxyPool::new("test");
        let good = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();
        pool.add_proxy(
            Proxy::builder("http://10.0.0.2:8080")
                .health_status(HealthStatus::Dead)
                .build()
                .unwrap(),
        )
        .unwrap();

        let strategy = RoundRobinStrategy::new();
        for _ in 0..3 {
            assert_eq!(strategy.select(&pool, None).unwrap().id(), good.id());
        }
    }

    #[test]
    fn test_honors_failed_proxy_ids() {
        let pool = ProxyPool::new("test");
        let p1 = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();
        let p2 = pool.add_proxy(healthy("http://10.0.0.2:8080")).unwrap().unwrap();

        let mut ctx = SelectionContext::new();
        ctx.mark_failed(p1.id());

        let strategy = RoundRobinStrategy::new();
        for _ in 0..3 {
            assert_eq!(strategy.select(&pool, Some(&ctx)).unwrap().id(), p2.id());
        }
    }

    #[test]
    fn test_record_result_updates_stats() {
        let pool = ProxyPool::new("test");
        let proxy = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();

        let strategy = RoundRobinStrategy::new();
        let selected = strategy.select(&pool, None).unwrap();
        strategy.record_result(&selected, true, 150.0);

        assert_eq!(proxy.total_successes(), 1);
        assert_eq!(proxy.average_response_time_ms(), Some(150.0));

        let selected = strategy.select(&pool, None).unwrap();
        strategy.record_result(&selected, false, 0.0);
        assert_eq!(proxy.total_failures(), 1);
        assert_eq!(proxy.consecutive_failures(), 1);
    }

    #[test]
    fn test_configure_applies_ema_alpha_on_select() {
        let pool = ProxyPool::new("test");
        let proxy = pool.add_proxy(healthy("http://10.0.0.1:8080")).unwrap().unwrap();
        assert_eq!(proxy.ema_alpha(), 0.2);

        let strategy = RoundRobinStrategy::new();
        strategy.configure(StrategyConfig {
            ema_alpha: Some(0.4),
            ..StrategyConfig::default()
        });

        let selected = strategy.select(&pool, None).unwrap();
        assert_eq!(selected.ema_alpha(), 0.4);

        strategy.record_result(&selected, true, 100.0);
        strategy.record_result(&selected, true, 200.0);
        let expected = 0.4 * 200.0 + 0.6 * 100.0;
        assert_eq!(selected.average_response_time_ms(), Some(expected));
        assert_eq!(selected.ema_response_time_ms(), Some(expected));
    }

    #[test]
    fn test_independent_instances() {
        let pool = ProxyPool::new("test");
        for i in 1..=2 {
            pool.add_proxy(healthy(&format!("http://10.0.0.{}:8080", i)))
                .unwrap();
        }

        let a = RoundRobinStrategy::new();
        let b = RoundRobinStrategy::new();
        assert_eq!(
            a.select(&pool, None).unwrap().id(),
            b.select(&pool, None).unwrap().id()
        );
    }
}
