//! Session-persistence proxy selection strategy

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{apply_ema_alpha, RotationStrategy, RoundRobinStrategy, StrategyConfig};
use crate::error::Result;
use crate::models::{Proxy, SelectionContext};
use crate::pool::ProxyPool;

/// Default lifetime of a session -> proxy binding
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);

struct SessionEntry {
    proxy_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Sticks callers carrying a `session_id` to one proxy.
///
/// On a miss, an expired binding, or a bound proxy that is no longer
/// selectable, a fresh proxy is chosen with the fallback strategy and the
/// binding is re-recorded. Bindings to removed proxies are purged immediately
/// via `on_proxy_removed`; TTL expiry is independent and additional.
pub struct SessionStrategy {
    sessions: DashMap<String, SessionEntry>,
    fallback: Arc<dyn RotationStrategy>,
    ttl: RwLock<Duration>,
    config: RwLock<StrategyConfig>,
}

impl SessionStrategy {
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(RoundRobinStrategy::new()))
    }

    pub fn with_fallback(fallback: Arc<dyn RotationStrategy>) -> Self {
        Self {
            sessions: DashMap::new(),
            fallback,
            ttl: RwLock::new(DEFAULT_SESSION_TTL),
            config: RwLock::new(StrategyConfig::default()),
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        *self.ttl.write() = ttl;
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn bound_proxy(
        &self,
        pool: &ProxyPool,
        session_id: &str,
        ctx: &SelectionContext,
    ) -> Option<Arc<Proxy>> {
        let entry = self.sessions.get(session_id)?;
        if Utc::now() >= entry.expires_at {
            drop(entry);
            self.sessions.remove(session_id);
            return None;
        }

        let proxy = pool.get_proxy_by_id(entry.proxy_id)?;
        if !proxy.is_selectable() || ctx.is_excluded(proxy.id()) {
            return None;
        }
        Some(proxy)
    }

    fn bind(&self, session_id: &str, proxy_id: Uuid) {
        let ttl = *self.ttl.read();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(600));
        self.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                proxy_id,
                expires_at,
            },
        );
    }
}

impl Default for SessionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStrategy for SessionStrategy {
    fn select(&self, pool: &ProxyPool, ctx: Option<&SelectionContext>) -> Result<Arc<Proxy>> {
        let session_id = ctx.and_then(|c| c.session_id.as_deref());

        let Some(session_id) = session_id else {
            return self.fallback.select(pool, ctx);
        };
        let ctx = ctx.expect("session_id implies context");

        if let Some(proxy) = self.bound_proxy(pool, session_id, ctx) {
            apply_ema_alpha(&self.config.read(), &proxy);
            proxy.start_request();
            return Ok(proxy);
        }

        let proxy = self.fallback.select(pool, Some(ctx))?;
        self.bind(session_id, proxy.id());
        debug!(session = session_id, proxy = %proxy, "Bound session to proxy");
        apply_ema_alpha(&self.config.read(), &proxy);
        Ok(proxy)
    }

    fn configure(&self, config: StrategyConfig) {
        if let Some(ttl) = config.session_ttl {
            *self.ttl.write() = ttl;
        }
        self.fallback.configure(config.clone());
        *self.config.write() = config;
    }

    fn on_proxy_removed(&self, proxy_id: Uuid) {
        self.sessions.retain(|_, entry| entry.proxy_id != proxy_id);
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
