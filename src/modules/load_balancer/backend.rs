//! Backend units and the backend pool.

use super::error::{LoadBalancerError, LoadBalancerResult};
use super::failover::FailoverHandler;
use super::proxy::{parse_backend_url, HttpClient, ReverseProxy};
use super::retry::RetryPolicy;
use crate::modules::http_handler::response::{BoxError, ProxyBody};
use bytes::Bytes;
use http::{Request, Response, Uri};
use hyper::body::Body;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Timeout of a single liveness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single upstream server.
#[derive(Debug)]
pub struct Backend {
    /// Backend URL.
    url: Uri,
    /// `host:port` used for probes.
    address: String,
    /// Liveness flag.
    alive: RwLock<bool>,
    /// Forwarding handle.
    proxy: ReverseProxy,
    /// Error callback bound to this backend.
    failover: FailoverHandler,
}

impl Backend {
    /// Create a live backend for `url`.
    ///
    /// The failover handler is bound to the returned `Arc` without keeping it alive.
    pub fn new(
        url: &str,
        client: HttpClient,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> LoadBalancerResult<Arc<Self>> {
        let (url, address) = parse_backend_url(url)?;
        let proxy = ReverseProxy::new(&url, client, timeout)?;

        Ok(Arc::new_cyclic(|weak| Self {
            url,
            address,
            alive: RwLock::new(true),
            proxy,
            failover: FailoverHandler::new(weak.clone(), policy),
        }))
    }

    /// Backend URL.
    #[must_use]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Backend `host:port`.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Host as written in the URL; the port appears only when given.
    #[must_use]
    pub fn host(&self) -> &str {
        self.proxy.authority().as_str()
    }

    /// Failover handler bound to this backend.
    #[must_use]
    pub fn failover(&self) -> &FailoverHandler {
        &self.failover
    }

    /// Set the liveness flag.
    pub fn set_alive(&self, alive: bool) {
        *self.alive.write().unwrap_or_else(PoisonError::into_inner) = alive;
    }

    /// Read the liveness flag.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        *self.alive.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try a bare TCP connect to the backend.
    ///
    /// Leaves the liveness flag untouched.
    pub async fn probe_liveness(&self) -> LoadBalancerResult<()> {
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(self.address.as_str())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                debug!(backend = %self.address, error = %e, "Liveness probe failed");
                Err(LoadBalancerError::BackendUnavailable(self.address.clone()))
            },
            Err(_) => {
                debug!(backend = %self.address, "Liveness probe timed out");
                Err(LoadBalancerError::BackendUnavailable(self.address.clone()))
            },
        }
    }

    /// Forward a request; transport errors go to the failover handler.
    pub async fn serve<B>(&self, req: Request<B>, client_ip: Option<IpAddr>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        match self.proxy.forward(req, client_ip).await {
            Ok(response) => response,
            Err(e) => self.failover.handle(e).await,
        }
    }
}

/// Ordered set of backends behind one lock.
#[derive(Debug, Default)]
pub struct BackendPool {
    backends: RwLock<Vec<Arc<Backend>>>,
}

impl BackendPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access to the backend sequence.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Backend>>> {
        self.backends.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the backend sequence.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Backend>>> {
        self.backends.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all backends.
    #[must_use]
    pub fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.read().clone()
    }

    /// Number of backends.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.read().len()
    }

    /// Number of backends marked alive.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.read().iter().filter(|b| b.is_alive()).count()
    }

    /// Check if the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
