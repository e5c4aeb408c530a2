//! Round-robin engine owning the backend set.

use super::backend::{Backend, BackendPool};
use super::config::{BalancerConfig, RetryConfig};
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::health::{HealthCheck, HealthCheckTask};
use super::proxy::{http_client, HttpClient};
use super::retry::RetryPolicy;
use super::strategy::{RoundRobinStrategy, StrategyContainer};
use crate::modules::http_handler::response::{self, BoxError, ProxyBody};
use bytes::Bytes;
use http::{Request, Response};
use hyper::body::Body;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default timeout for a proxied upstream exchange.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Load balancer statistics.
#[derive(Debug, Default)]
pub struct LoadBalancerStats {
    /// Total selections made.
    pub total_selections: AtomicU64,
    /// Successful selections.
    pub successful_selections: AtomicU64,
    /// Failed selections (no live backend).
    pub failed_selections: AtomicU64,
}

impl LoadBalancerStats {
    /// Record a selection.
    pub fn record_selection(&self, success: bool) {
        self.total_selections.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_selections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_selections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `(total, successful, failed)` selection counts.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.total_selections.load(Ordering::Relaxed),
            self.successful_selections.load(Ordering::Relaxed),
            self.failed_selections.load(Ordering::Relaxed),
        )
    }
}

/// Round-robin dispatcher over an ordered backend set.
///
/// All structural access to the set goes through one reader/writer lock;
/// each backend guards its own liveness flag.
pub struct LoadBalancer {
    pool: BackendPool,
    strategy: StrategyContainer,
    policy: RetryPolicy,
    client: HttpClient,
    upstream_timeout: Duration,
    stats: Arc<LoadBalancerStats>,
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("strategy", &self.strategy.name())
            .field("backends", &self.pool.backend_count())
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish()
    }
}

impl LoadBalancer {
    /// Create an empty round-robin balancer.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_strategy(StrategyContainer::RoundRobin(RoundRobinStrategy::new()), policy)
    }

    /// Create an empty balancer using `strategy`.
    #[must_use]
    pub fn with_strategy(strategy: StrategyContainer, policy: RetryPolicy) -> Self {
        Self {
            pool: BackendPool::new(),
            strategy,
            policy,
            client: http_client(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            stats: Arc::new(LoadBalancerStats::default()),
        }
    }

    /// Build a balancer from configuration and register its inline backends.
    ///
    /// # Errors
    ///
    /// Fails when the strategy name is unknown or not implemented.
    pub fn from_config(config: &BalancerConfig, retry: RetryConfig) -> LoadBalancerResult<Self> {
        let strategy = StrategyContainer::from_name(&config.strategy)?;
        let balancer = Self::with_strategy(strategy, retry.into());
        for entry in &config.backends {
            balancer.register_backend(&entry.url);
        }
        Ok(balancer)
    }

    /// Set the upstream exchange timeout for backends registered afterwards.
    #[must_use]
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Name of the active strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Selection statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<LoadBalancerStats> {
        &self.stats
    }

    fn build_backend(&self, url: &str) -> Option<Arc<Backend>> {
        match Backend::new(url, self.client.clone(), self.policy, self.upstream_timeout) {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!(url, error = %e, "Skipping invalid backend");
                None
            },
        }
    }

    /// Register a live backend.
    ///
    /// Unparseable URLs are logged and skipped.
    pub fn register_backend(&self, url: &str) {
        if let Some(backend) = self.build_backend(url) {
            info!(backend = %backend.address(), "Registered backend");
            self.pool.write().push(backend);
        }
    }

    /// Drop every backend and reset the cursor.
    pub fn remove_all_backends(&self) {
        let mut backends = self.pool.write();
        backends.clear();
        self.strategy.as_strategy().reset();
        info!("Removed all backends");
    }

    /// Swap in a new backend set under a single lock acquisition.
    ///
    /// Returns the number of backends registered.
    pub fn replace_backends<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fresh: Vec<Arc<Backend>> = urls
            .into_iter()
            .filter_map(|url| self.build_backend(url.as_ref()))
            .collect();
        let count = fresh.len();

        let mut backends = self.pool.write();
        *backends = fresh;
        self.strategy.as_strategy().reset();
        drop(backends);

        info!(count, "Replaced backend set");
        count
    }

    /// Pick the next live backend.
    #[must_use]
    pub fn select_backend(&self) -> Option<Arc<Backend>> {
        let backends = self.pool.read();
        let selected = self
            .strategy
            .as_strategy()
            .select(&backends)
            .map(|idx| Arc::clone(&backends[idx]));
        self.stats.record_selection(selected.is_some());
        selected
    }

    /// Snapshot of the backend set.
    #[must_use]
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.pool.all_backends()
    }

    /// Number of registered backends.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.pool.backend_count()
    }

    /// Number of backends currently marked alive.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.pool.alive_count()
    }

    /// Forward `req` to the next live backend.
    pub async fn dispatch<B>(&self, req: Request<B>, client_ip: Option<IpAddr>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        if self.pool.is_empty() {
            debug!(error = %LoadBalancerError::NoBackendsAvailable, "Rejecting request");
            return response::no_backends();
        }

        match self.select_backend() {
            Some(backend) => {
                debug!(backend = %backend.address(), path = %req.uri().path(), "Dispatching request");
                backend.serve(req, client_ip).await
            },
            None => {
                warn!(error = %LoadBalancerError::NoHealthyBackends, "Rejecting request");
                response::all_backends_unavailable()
            },
        }
    }

    /// Start the background health sweep.
    pub fn spawn_health_checks(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let task = HealthCheckTask::new(HealthCheck::new(interval), Arc::clone(self), shutdown);
        tokio::spawn(task.run())
    }
}
