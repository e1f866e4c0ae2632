//! Thread-safe proxy pool with an ordered list and an id index.
//!
//! All mutations run under one pool-wide mutex and keep the ordered list and
//! the `id -> proxy` index in lockstep. Query operations return independent
//! snapshots so callers never iterate under the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{CarouselError, Result};
use crate::models::{HealthStatus, PoolStats, Proxy, ProxySource};

/// Default cap on pool membership
pub const DEFAULT_MAX_POOL_SIZE: usize = 1000;

struct PoolInner {
    proxies: Vec<Arc<Proxy>>,
    by_id: HashMap<uuid::Uuid, Arc<Proxy>>,
    updated_at: DateTime<Utc>,
}

impl PoolInner {
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn rebuild_index(&mut self) {
        self.by_id = self
            .proxies
            .iter()
            .map(|p| (p.id(), Arc::clone(p)))
            .collect();
    }
}

/// Named, bounded, ordered set of proxies.
///
/// Insertion order is preserved and serves as the round-robin tie-break.
pub struct ProxyPool {
    name: String,
    max_pool_size: usize,
    inner: Mutex<PoolInner>,
}

impl ProxyPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_MAX_POOL_SIZE)
    }

    pub fn with_capacity(name: impl Into<String>, max_pool_size: usize) -> Self {
        Self {
            name: name.into(),
            max_pool_size,
            inner: Mutex::new(PoolInner {
                proxies: Vec::new(),
                by_id: HashMap::new(),
                updated_at: Utc::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    pub fn len(&self) -> usize {
        self.inner.lock().proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().proxies.is_empty()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.inner.lock().updated_at
    }

    /// Add a proxy to the pool.
    ///
    /// Returns `Ok(Some(_))` with the shared handle on insertion,
    /// `Ok(None)` when a proxy with the same URL already exists (first wins),
    /// and `Err(PoolCapacity)` when the pool is full.
    pub fn add_proxy(&self, proxy: Proxy) -> Result<Option<Arc<Proxy>>> {
        let mut inner = self.inner.lock();

        if inner.proxies.len() >= self.max_pool_size {
            return Err(CarouselError::PoolCapacity {
                max_size: self.max_pool_size,
            });
        }

        if inner.proxies.iter().any(|p| p.url() == proxy.url()) {
            debug!(url = %proxy.url(), "Ignoring duplicate proxy");
            return Ok(None);
        }

        let proxy = Arc::new(proxy);
        inner.proxies.push(Arc::clone(&proxy));
        inner.by_id.insert(proxy.id(), Arc::clone(&proxy));
        inner.touch();

        debug!(url = %proxy.url(), pool = %self.name, "Added proxy");
        Ok(Some(proxy))
    }

    /// Remove a proxy by id. Idempotent; returns the removed proxy if present.
    pub fn remove_proxy(&self, id: uuid::Uuid) -> Option<Arc<Proxy>> {
        let mut inner = self.inner.lock();

        let removed = inner.by_id.remove(&id)?;
        inner.proxies.retain(|p| p.id() != id);
        inner.touch();

        debug!(url = %removed.url(), pool = %self.name, "Removed proxy");
        Some(removed)
    }

    /// O(1) lookup by id
    pub fn get_proxy_by_id(&self, id: uuid::Uuid) -> Option<Arc<Proxy>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    /// Independent snapshot of the whole pool in insertion order
    pub fn get_all_proxies(&self) -> Vec<Arc<Proxy>> {
        self.inner.lock().proxies.clone()
    }

    /// Snapshot of proxies eligible for selection: healthy, degraded or
    /// unknown, and not expired
    pub fn get_healthy_proxies(&self) -> Vec<Arc<Proxy>> {
        self.inner
            .lock()
            .proxies
            .iter()
            .filter(|p| p.is_selectable())
            .cloned()
            .collect()
    }

    /// Proxies carrying every tag in `tags` (AND semantics)
    pub fn filter_by_tags(&self, tags: &HashSet<String>) -> Vec<Arc<Proxy>> {
        self.inner
            .lock()
            .proxies
            .iter()
            .filter(|p| tags.iter().all(|t| p.tags().contains(t)))
            .cloned()
            .collect()
    }

    pub fn filter_by_source(&self, source: ProxySource) -> Vec<Arc<Proxy>> {
        self.inner
            .lock()
            .proxies
            .iter()
            .filter(|p| p.source() == source)
            .cloned()
            .collect()
    }

    /// Remove proxies with unhealthy or dead status; returns the count removed
    pub fn clear_unhealthy(&self) -> usize {
        self.clear_where(|p| p.health_status().is_unhealthy(), "unhealthy")
    }

    /// Remove proxies past their TTL; returns the count removed
    pub fn clear_expired(&self) -> usize {
        self.clear_where(|p| p.is_expired(), "expired")
    }

    fn clear_where(&self, predicate: impl Fn(&Proxy) -> bool, label: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.proxies.len();

        inner.proxies.retain(|p| !predicate(p));
        let removed = before - inner.proxies.len();

        if removed > 0 {
            inner.rebuild_index();
            inner.touch();
            info!(count = removed, pool = %self.name, "Cleared {} proxies", label);
        }
        removed
    }

    pub fn healthy_count(&self) -> usize {
        self.inner
            .lock()
            .proxies
            .iter()
            .filter(|p| p.is_healthy())
            .count()
    }

    pub fn unhealthy_count(&self) -> usize {
        self.inner
            .lock()
            .proxies
            .iter()
            .filter(|p| p.health_status().is_unhealthy())
            .count()
    }

    /// Internally consistent aggregate view, computed under the lock
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();

        let mut healthy = 0usize;
        let mut unhealthy = 0usize;
        let mut degraded = 0usize;
        let mut unknown = 0usize;
        let mut total_requests = 0u64;
        let mut total_successes = 0u64;
        let mut total_failures = 0u64;
        let mut source_breakdown: HashMap<ProxySource, usize> = HashMap::new();

        for proxy in &inner.proxies {
            match proxy.health_status() {
                HealthStatus::Healthy => healthy += 1,
                HealthStatus::Degraded => degraded += 1,
                HealthStatus::Unknown => unknown += 1,
                HealthStatus::Unhealthy | HealthStatus::Dead => unhealthy += 1,
            }
            total_requests += proxy.total_requests();
            total_successes += proxy.total_successes();
            total_failures += proxy.total_failures();
            *source_breakdown.entry(proxy.source()).or_insert(0) += 1;
        }

        let overall_success_rate = if total_requests == 0 {
            0.0
        } else {
            total_successes as f64 / total_requests as f64
        };

        PoolStats {
            name: self.name.clone(),
            size: inner.proxies.len(),
            max_pool_size: self.max_pool_size,
            healthy_count: healthy,
            unhealthy_count: unhealthy,
            degraded_count: degraded,
            unknown_count: unknown,
            total_requests,
            total_successes,
            total_failures,
            overall_success_rate,
            source_breakdown,
            updated_at: inner.updated_at,
        }
    }

    #[cfg(test)]
    fn index_len(&self) -> usize {
        self.inner.lock().by_id.len()
    }
}
