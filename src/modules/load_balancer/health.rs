//! Active health checks for backend servers.

use super::backend::Backend;
use super::balancer::LoadBalancer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Health status of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend accepted a connection.
    Healthy,
    /// Backend could not be reached.
    Unhealthy,
}

/// Result of a health check.
#[derive(Debug)]
pub struct HealthCheckResult {
    /// Backend address.
    pub address: String,
    /// Health status.
    pub status: HealthStatus,
    /// Probe duration.
    pub response_time: Duration,
    /// Error message if unhealthy.
    pub error: Option<String>,
}

/// Health check executor.
#[derive(Debug, Clone, Copy)]
pub struct HealthCheck {
    interval: Duration,
}

impl HealthCheck {
    /// Create a new health checker.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Get the check interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe one backend and update its liveness flag.
    pub async fn check(&self, backend: &Backend) -> HealthCheckResult {
        let start = Instant::now();
        let result = backend.probe_liveness().await;
        let response_time = start.elapsed();

        match result {
            Ok(()) => {
                backend.set_alive(true);
                debug!(
                    backend = %backend.address(),
                    response_time_ms = response_time.as_millis() as u64,
                    "Health check passed"
                );
                HealthCheckResult {
                    address: backend.address().to_string(),
                    status: HealthStatus::Healthy,
                    response_time,
                    error: None,
                }
            },
            Err(e) => {
                backend.set_alive(false);
                warn!(backend = %backend.address(), error = %e, "Health check failed");
                HealthCheckResult {
                    address: backend.address().to_string(),
                    status: HealthStatus::Unhealthy,
                    response_time,
                    error: Some(e.to_string()),
                }
            },
        }
    }

    /// Run health checks on every backend in order.
    pub async fn check_all(&self, backends: &[Arc<Backend>]) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(backends.len());
        for backend in backends {
            results.push(self.check(backend).await);
        }
        results
    }
}

/// Health sweep that runs until shutdown.
#[derive(Debug)]
pub struct HealthCheckTask {
    health_check: HealthCheck,
    balancer: Arc<LoadBalancer>,
    shutdown: watch::Receiver<bool>,
}

impl HealthCheckTask {
    /// Create a new health check task.
    #[must_use]
    pub fn new(
        health_check: HealthCheck,
        balancer: Arc<LoadBalancer>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            health_check,
            balancer,
            shutdown,
        }
    }

    /// Run the sweep loop.
    pub async fn run(mut self) {
        let interval = self.health_check.interval();
        info!(interval_ms = interval.as_millis() as u64, "Starting health check task");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    debug!("Health check task shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    // Probe a snapshot so the pool lock is not held across probes.
                    let backends = self.balancer.backends();
                    let results = self.health_check.check_all(&backends).await;

                    let healthy = results.iter().filter(|r| r.status == HealthStatus::Healthy).count();
                    info!(healthy, total = results.len(), "Health check completed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::proxy::http_client;
    use crate::modules::load_balancer::retry::RetryPolicy;
    use tokio::net::TcpListener;

    fn backend(url: &str) -> Arc<Backend> {
        Backend::new(url, http_client(), RetryPolicy::default(), Duration::from_secs(1)).unwrap()
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_check_demotes_unreachable() {
        let b = backend(&format!("http://127.0.0.1:{}", closed_port().await));
        let check = HealthCheck::new(Duration::from_secs(10));

        let result = check.check(&b).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.is_some());
        assert!(!b.is_alive());
    }

    #[tokio::test]
    async fn test_check_promotes_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let b = backend(&format!("http://127.0.0.1:{port}"));
        b.set_alive(false);

        let check = HealthCheck::new(Duration::from_secs(10));
        let result = check.check(&b).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(b.is_alive());
    }

    #[tokio::test]
    async fn test_task_sweeps_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = listener.local_addr().unwrap().port();
        let down = closed_port().await;

        let balancer = Arc::new(LoadBalancer::new(RetryPolicy::default()));
        balancer.register_backend(&format!("http://127.0.0.1:{up}"));
        balancer.register_backend(&format!("http://127.0.0.1:{down}"));
        balancer.backends()[0].set_alive(false);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = HealthCheckTask::new(
            HealthCheck::new(Duration::from_millis(20)),
            Arc::clone(&balancer),
            shutdown_rx,
        );
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let backends = balancer.backends();
        assert!(backends[0].is_alive());
        assert!(!backends[1].is_alive());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
