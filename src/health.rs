//! Background health monitoring for pool members.
//!
//! One long-lived task probes every proxy on an interval, feeds the results
//! into the per-proxy circuit breakers, and evicts proxies that fail enough
//! consecutive probes. The monitor keeps its own failure ledger: only probes
//! it issued count toward eviction, never regular traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{ProxiedRequest, ProxyClient, ReqwestProxyClient};
use crate::error::{CarouselError, Result};
use crate::models::{HealthStatus, MonitorStatus, Proxy};
use crate::pool::ProxyPool;
use crate::rotator::BreakerMap;

/// Health monitor configuration
#[derive(Clone)]
pub struct HealthMonitorConfig {
    /// Interval between check rounds
    pub check_interval: Duration,
    /// Timeout for each individual probe
    pub check_timeout: Duration,
    /// URL fetched through each proxy
    pub check_url: String,
    /// Consecutive probe failures before a proxy is evicted
    pub failure_threshold: u32,
    /// Probes in flight at once per round
    pub max_concurrent_checks: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(10),
            check_url: "http://www.google.com".to_string(),
            failure_threshold: 3,
            max_concurrent_checks: 8,
        }
    }
}

impl HealthMonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.check_interval.is_zero() {
            return Err(CarouselError::InvalidConfig(
                "health check_interval must be positive".into(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(CarouselError::InvalidConfig(
                "health failure_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Pluggable probe implementation
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, proxy: &Proxy) -> Result<()>;
}

/// Default probe: a small GET through the proxy to a well-known endpoint
pub struct HttpHealthProbe {
    client: Arc<dyn ProxyClient>,
    check_url: String,
    check_timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(client: Arc<dyn ProxyClient>, check_url: impl Into<String>, check_timeout: Duration) -> Self {
        Self {
            client,
            check_url: check_url.into(),
            check_timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, proxy: &Proxy) -> Result<()> {
        let request =
            ProxiedRequest::get(self.check_url.clone()).timeout(self.check_timeout);
        let response = self.client.send(&request, proxy).await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(CarouselError::Connection {
                proxy_url: proxy.url().to_string(),
                message: format!("health check returned status {}", response.status),
                retry_recommended: true,
            })
        }
    }
}

struct MonitorCore {
    pool: Arc<ProxyPool>,
    breakers: Arc<BreakerMap>,
    probe: Arc<dyn HealthProbe>,
    config: HealthMonitorConfig,
    /// Consecutive probe failures keyed by sanitized URL
    failure_counts: DashMap<String, u32>,
}

impl MonitorCore {
    /// One probe round over a snapshot of the pool
    #[instrument(skip(self))]
    async fn check_all(&self) {
        let proxies = self.pool.get_all_proxies();
        if proxies.is_empty() {
            return;
        }
        debug!(count = proxies.len(), "Starting health check round");

        let results: Vec<(Arc<Proxy>, Result<()>)> = futures::stream::iter(proxies)
            .map(|proxy| async move {
                let outcome =
                    match timeout(self.config.check_timeout, self.probe.probe(&proxy)).await {
                        Ok(result) => result,
                        Err(_) => Err(CarouselError::Timeout {
                            proxy_url: proxy.url().to_string(),
                        }),
                    };
                (proxy, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        let mut healthy = 0usize;
        let mut unhealthy = 0usize;
        for (proxy, outcome) in results {
            match outcome {
                Ok(()) => {
                    healthy += 1;
                    self.record_probe_success(&proxy);
                }
                Err(err) => {
                    unhealthy += 1;
                    // A failing probe implementation is itself a failed probe.
                    warn!(proxy = %proxy, error = %err, "Health probe failed");
                    self.record_probe_failure(&proxy);
                }
            }
        }

        info!(healthy, unhealthy, "Health check round complete");
    }

    fn record_probe_success(&self, proxy: &Arc<Proxy>) {
        self.failure_counts.remove(proxy.url());
        proxy.set_health_status(HealthStatus::Healthy);
        if let Some(breaker) = self.breakers.get(&proxy.id()) {
            breaker.record_success();
        }
    }

    fn record_probe_failure(&self, proxy: &Arc<Proxy>) {
        if let Some(breaker) = self.breakers.get(&proxy.id()) {
            breaker.record_failure();
        }

        let mut failures = self.failure_counts.entry(proxy.url().to_string()).or_insert(0);
        *failures += 1;
        let count = *failures;
        drop(failures);

        if count >= self.config.failure_threshold {
            info!(
                proxy = %proxy,
                failures = count,
                "Evicting proxy after consecutive probe failures"
            );
            self.pool.remove_proxy(proxy.id());
            self.breakers.remove(&proxy.id());
            self.failure_counts.remove(proxy.url());
        } else {
            proxy.set_health_status(HealthStatus::Degraded);
        }
    }
}

struct MonitorState {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    started_at: Option<Instant>,
}

/// Continuous health monitor over one pool
pub struct HealthMonitor {
    core: Arc<MonitorCore>,
    state: Mutex<MonitorState>,
}

impl HealthMonitor {
    pub fn new(
        pool: Arc<ProxyPool>,
        breakers: Arc<BreakerMap>,
        config: HealthMonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let probe = Arc::new(HttpHealthProbe::new(
            Arc::new(ReqwestProxyClient::new()),
            config.check_url.clone(),
            config.check_timeout,
        ));
        Ok(Self::with_probe(pool, breakers, config, probe))
    }

    /// Monitor with a custom probe implementation (validation already applied
    /// to the config by the caller for the default constructor)
    pub fn with_probe(
        pool: Arc<ProxyPool>,
        breakers: Arc<BreakerMap>,
        config: HealthMonitorConfig,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            core: Arc::new(MonitorCore {
                pool,
                breakers,
                probe,
                config,
                failure_counts: DashMap::new(),
            }),
            state: Mutex::new(MonitorState {
                handle: None,
                shutdown_tx: None,
                started_at: None,
            }),
        }
    }

    /// Spawn the monitor task. No-op if already running.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.handle.is_some() {
            debug!("Health monitor already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let core = Arc::clone(&self.core);

        let handle = tokio::spawn(async move {
            info!(
                interval_secs = core.config.check_interval.as_secs(),
                "Health monitor started"
            );
            let mut ticker = interval(core.config.check_interval);
            ticker.tick().await; // Skip immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        core.check_all().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Health monitor shutting down");
                            break;
                        }
                    }
                }
            }
        });

        state.handle = Some(handle);
        state.shutdown_tx = Some(shutdown_tx);
        state.started_at = Some(Instant::now());
    }

    /// Cancel the monitor task and wait for it. No-op if not running.
    pub async fn stop(&self) {
        let (handle, shutdown_tx) = {
            let mut state = self.state.lock();
            state.started_at = None;
            (state.handle.take(), state.shutdown_tx.take())
        };

        let Some(handle) = handle else {
            return;
        };

        if let Some(tx) = shutdown_tx {
            let _ = tx.send(true);
        }
        if let Err(err) = handle.await {
            error!(error = %err, "Health monitor task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    pub fn status(&self) -> MonitorStatus {
        let state = self.state.lock();
        let failure_counts: HashMap<String, u32> = self
            .core
            .failure_counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        MonitorStatus {
            is_running: state.handle.is_some(),
            check_interval_secs: self.core.config.check_interval.as_secs(),
            failure_threshold: self.core.config.failure_threshold,
            total_proxies: self.core.pool.len(),
            healthy_proxies: self.core.pool.healthy_count(),
            failure_counts,
            uptime_seconds: state.started_at.map(|at| at.elapsed().as_secs_f64()),
        }
    }
}
