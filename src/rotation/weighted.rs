//! Success-rate weighted proxy selection strategy

use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;

use super::{apply_ema_alpha, selectable_candidates, RotationStrategy, StrategyConfig};
use crate::error::{CarouselError, Result};
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Minimum weight so an unlucky proxy is never fully starved
const WEIGHT_FLOOR: f64 = 0.1;

/// Weighted-random selection biased toward higher success rates
pub struct WeightedStrategy {
    config: RwLock<StrategyConfig>,
}

impl WeightedStrategy {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(StrategyConfig::default()),
        }
    }

    fn weight(proxy: &Proxy) -> f64 {
        proxy.success_rate().max(WEIGHT_FLOOR)
    }
}

impl Default for WeightedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for WeightedStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let candidates = selectable_candidates(pool, ctx)?;

        let weights: Vec<f64> = candidates.iter().map(|p| Self::weight(p)).collect();
        let total: f64 = weights.iter().sum();

        let mut draw = rand::thread_rng().gen_range(0.0..total);
        let mut chosen = None;
        for (proxy, weight) in candidates.iter().zip(&weights) {
            if draw < *weight {
                chosen = Some(Arc::clone(proxy));
                break;
            }
            draw -= weight;
        }
        // Floating point drift can leave the draw past the final bucket.
        let proxy = chosen
            .or_else(|| candidates.last().cloned())
            .ok_or(CarouselError::PoolEmpty)?;

        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
