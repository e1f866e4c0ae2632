//! Composite strategy: candidate filters feeding a single selector

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use super::{apply_ema_alpha, selectable_candidates, RotationStrategy, StrategyConfig};
use crate::error::{CarouselError, Result};
use crate::models::{Proxy, ProxySource, SelectionContext};
use crate::pool::ProxyPool;

/// Narrows a candidate set; filters are applied in order
pub trait CandidateFilter: Send + Sync {
    fn filter(
        &self,
        candidates: Vec<Arc<Proxy>>,
        ctx: Option<&SelectionContext>,
    ) -> Vec<Arc<Proxy>>;
}

/// Picks one proxy from the surviving candidates
pub trait CandidateSelector: Send + Sync {
    fn pick(&self, candidates: &[Arc<Proxy>]) -> Option<Arc<Proxy>>;
}

/// Keep proxies carrying every one of the given tags
pub struct TagFilter {
    tags: HashSet<String>,
}

impl TagFilter {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl CandidateFilter for TagFilter {
    fn filter(
        &self,
        candidates: Vec<Arc<Proxy>>,
        _ctx: Option<&SelectionContext>,
    ) -> Vec<Arc<Proxy>> {
        candidates
            .into_iter()
            .filter(|p| self.tags.iter().all(|t| p.tags().contains(t)))
            .collect()
    }
}

/// Keep proxies whose country matches
pub struct CountryFilter {
    country: String,
}

impl CountryFilter {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
        }
    }
}

impl CandidateFilter for CountryFilter {
    fn filter(
        &self,
        candidates: Vec<Arc<Proxy>>,
        _ctx: Option<&SelectionContext>,
    ) -> Vec<Arc<Proxy>> {
        candidates
            .into_iter()
            .filter(|p| {
                p.country_code()
                    .is_some_and(|c| c.eq_ignore_ascii_case(&self.country))
            })
            .collect()
    }
}

/// Keep proxies from one source
pub struct SourceFilter {
    source: ProxySource,
}

impl SourceFilter {
    pub fn new(source: ProxySource) -> Self {
        Self { source }
    }
}

impl CandidateFilter for SourceFilter {
    fn filter(
        &self,
        candidates: Vec<Arc<Proxy>>,
        _ctx: Option<&SelectionContext>,
    ) -> Vec<Arc<Proxy>> {
        candidates
            .into_iter()
            .filter(|p| p.source() == self.source)
            .collect()
    }
}

/// Sequential pick with wraparound
#[derive(Default)]
pub struct RoundRobinPick {
    index: AtomicUsize,
}

impl RoundRobinPick {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CandidateSelector for RoundRobinPick {
    fn pick(&self, candidates: &[Arc<Proxy>]) -> Option<Arc<Proxy>> {
        if candidates.is_empty() {
            return None;
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(idx).cloned()
    }
}

/// Uniform random pick
#[derive(Default)]
pub struct RandomPick;

impl RandomPick {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateSelector for RandomPick {
    fn pick(&self, candidates: &[Arc<Proxy>]) -> Option<Arc<Proxy>> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}

/// Chains filters over the healthy set, then delegates to one selector.
///
/// Composition over inheritance: shared behavior lives in the filter and
/// selector pieces, not in a strategy class hierarchy.
pub struct CompositeStrategy {
    filters: Vec<Box<dyn CandidateFilter>>,
    selector: Box<dyn CandidateSelector>,
    config: RwLock<StrategyConfig>,
}

impl CompositeStrategy {
    pub fn new(filters: Vec<Box<dyn CandidateFilter>>, selector: Box<dyn CandidateSelector>) -> Self {
        Self {
            filters,
            selector,
            config: RwLock::new(StrategyConfig::default()),
        }
    }
}

impl RotationStrategy for CompositeStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let mut candidates = selectable_candidates(pool, ctx)?;

        for filter in &self.filters {
            candidates = filter.filter(candidates, ctx);
            if candidates.is_empty() {
                return Err(CarouselError::PoolEmpty);
            }
        }

        let proxy = self
            .selector
            .pick(&candidates)
            .ok_or(CarouselError::PoolEmpty)?;

        apply_ema_alpha(&self.config.read(), &proxy);
        proxy.start_request();
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        *self.config.write() = config;
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}
