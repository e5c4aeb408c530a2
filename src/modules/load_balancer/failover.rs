//! Failover handling for proxy errors.
//!
//! A [`FailoverHandler`] is bound to exactly one backend when the backend is
//! registered. When forwarding through that backend fails it demotes the
//! backend, then walks the retry policy probing for recovery. Recovery only
//! repairs backend state; the failed request is never replayed.

use super::backend::Backend;
use super::error::LoadBalancerError;
use super::retry::RetryPolicy;
use crate::modules::http_handler::response::{self, ProxyBody};
use http::Response;
use std::sync::Weak;
use tracing::{info, warn};

/// Outcome of a recovery walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A probe succeeded and the backend was promoted.
    Recovered,
    /// Every probe failed; the backend stays demoted.
    Exhausted,
}

/// Error callback bound to a single backend.
#[derive(Debug, Clone)]
pub struct FailoverHandler {
    backend: Weak<Backend>,
    policy: RetryPolicy,
}

impl FailoverHandler {
    /// Bind a handler to `backend`.
    #[must_use]
    pub fn new(backend: Weak<Backend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Demote the backend and probe until it recovers or retries run out.
    ///
    /// Returns `None` when the backend has already been dropped.
    pub async fn recover(&self) -> Option<Recovery> {
        let backend = self.backend.upgrade()?;
        backend.set_alive(false);

        let result = self
            .policy
            .run(|| {
                let backend = &backend;
                async move { backend.probe_liveness().await }
            })
            .await;

        match result {
            Ok(()) => {
                backend.set_alive(true);
                info!(backend = %backend.address(), "Backend recovered");
                Some(Recovery::Recovered)
            },
            Err(e) => {
                warn!(
                    backend = %backend.address(),
                    attempts = self.policy.max_attempts(),
                    error = %e,
                    "Backend did not recover"
                );
                Some(Recovery::Exhausted)
            },
        }
    }

    /// Handle a proxy error and produce the client response.
    pub async fn handle(&self, error: LoadBalancerError) -> Response<ProxyBody> {
        let host = self
            .backend
            .upgrade()
            .map(|b| b.host().to_string())
            .unwrap_or_default();
        warn!(backend = %host, error = %error, "Proxy error, demoting backend");

        match self.recover().await {
            Some(Recovery::Recovered) => response::bad_gateway(),
            Some(Recovery::Exhausted) => response::backend_unavailable(&host),
            None => response::bad_gateway(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::proxy::http_client;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(5), Duration::from_millis(10))
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_recover_exhausted_keeps_backend_dead() {
        let port = closed_port().await;
        let backend = Backend::new(
            &format!("http://127.0.0.1:{port}"),
            http_client(),
            quick_policy(),
            Duration::from_secs(1),
        )
        .unwrap();

        let handler = backend.failover().clone();
        assert_eq!(handler.recover().await, Some(Recovery::Exhausted));
        assert!(!backend.is_alive());

        let response = handler
            .handle(LoadBalancerError::Proxy("refused".to_string()))
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], format!("Backend 127.0.0.1:{port} is unavailable").as_bytes());
    }

    #[tokio::test]
    async fn test_unavailable_body_names_host_without_default_port() {
        let backend = Backend::new(
            "http://backend.invalid",
            http_client(),
            quick_policy(),
            Duration::from_secs(1),
        )
        .unwrap();

        let response = backend
            .failover()
            .handle(LoadBalancerError::Proxy("refused".to_string()))
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Backend backend.invalid is unavailable");
    }

    #[tokio::test]
    async fn test_recover_promotes_reachable_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Backend::new(
            &format!("http://127.0.0.1:{port}"),
            http_client(),
            quick_policy(),
            Duration::from_secs(1),
        )
        .unwrap();

        let response = backend
            .failover()
            .handle(LoadBalancerError::Proxy("reset".to_string()))
            .await;

        assert!(backend.is_alive());
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        drop(listener);
    }

    #[tokio::test]
    async fn test_dropped_backend() {
        let backend = Backend::new(
            "http://127.0.0.1:1",
            http_client(),
            quick_policy(),
            Duration::from_secs(1),
        )
        .unwrap();
        let handler = backend.failover().clone();
        drop(backend);

        assert_eq!(handler.recover().await, None);
    }
}
