//! Per-client admission control on top of a bucket store.

use super::bucket::unix_now;
use super::config::BucketConfig;
use super::error::RateLimitError;
use super::store::BucketStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Rate limiter statistics.
#[derive(Debug, Default)]
pub struct RateLimitStats {
    /// Requests checked.
    pub requests_checked: AtomicU64,
    /// Requests allowed.
    pub requests_allowed: AtomicU64,
    /// Requests denied.
    pub requests_denied: AtomicU64,
    /// Buckets created.
    pub buckets_created: AtomicU64,
}

impl RateLimitStats {
    /// Record a check result.
    pub fn record_check(&self, allowed: bool) {
        self.requests_checked.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.requests_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `(checked, allowed, denied)` counts.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.requests_checked.load(Ordering::Relaxed),
            self.requests_allowed.load(Ordering::Relaxed),
            self.requests_denied.load(Ordering::Relaxed),
        )
    }
}

/// Token-bucket rate limiter keyed by client.
///
/// Store failures deny the request so an unreachable store never disables
/// the limit.
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    config: BucketConfig,
    stats: Arc<RateLimitStats>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BucketStore>, config: BucketConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(RateLimitStats::default()),
        }
    }

    /// Bucket defaults.
    #[must_use]
    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Limiter statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<RateLimitStats> {
        &self.stats
    }

    /// Decide whether `client_key` may send a request now.
    pub async fn allow(&self, client_key: &str) -> bool {
        let allowed = self.check(client_key).await;
        self.stats.record_check(allowed);
        allowed
    }

    async fn check(&self, client_key: &str) -> bool {
        match self.store.bucket(client_key).await {
            Ok(bucket) => {
                if bucket.available(unix_now()) < 1 {
                    debug!(client = client_key, "No tokens available");
                    return false;
                }
                match self.store.decrease(client_key).await {
                    Ok(granted) => {
                        if !granted {
                            debug!(client = client_key, "Token request denied");
                        }
                        granted
                    },
                    Err(e) => {
                        error!(client = client_key, error = %e, "Failed to decrease tokens");
                        false
                    },
                }
            },
            Err(RateLimitError::BucketNotFound(_)) => self.create(client_key).await,
            Err(e) => {
                error!(client = client_key, error = %e, "Failed to read bucket");
                false
            },
        }
    }

    async fn create(&self, client_key: &str) -> bool {
        let tokens = self.config.initial_tokens();
        debug!(client = client_key, tokens, "Creating bucket");

        match self
            .store
            .create_bucket(client_key, self.config.capacity, self.config.refill_rate, tokens)
            .await
        {
            Ok(()) => {
                self.stats.buckets_created.fetch_add(1, Ordering::Relaxed);
                true
            },
            Err(e) => {
                error!(client = client_key, error = %e, "Failed to create bucket");
                false
            },
        }
    }

    /// Run one refill sweep over every bucket.
    pub async fn refill_buckets(&self) {
        match self.store.refill_all_buckets(unix_now()).await {
            Ok(written) => debug!(written, "Refilled buckets"),
            Err(e) => error!(error = %e, "Failed to refill buckets"),
        }
    }

    /// Start the periodic refill sweep.
    ///
    /// Failed sweeps are logged and the schedule continues until shutdown.
    pub fn spawn_refill_task(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.config.refill_time);
            // The first tick completes immediately.
            ticker.tick().await;
            info!(
                interval_ms = limiter.config.refill_time.as_millis() as u64,
                store = limiter.store.name(),
                "Starting bucket refill task"
            );

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Stopping bucket refill task");
                        break;
                    }
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                info!("Stopping bucket refill task");
                                break;
                            }
                            () = limiter.refill_buckets() => {}
                        }
                    }
                }
            }
        })
    }
}
