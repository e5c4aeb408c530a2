//! Per-request pipeline: rate limit, then dispatch.

use super::middleware::{MiddlewareAction, RateLimitMiddleware};
use super::response::{BoxError, ProxyBody};
use crate::modules::load_balancer::LoadBalancer;
use crate::modules::rate_limiting::RateLimiter;
use bytes::Bytes;
use http::{Request, Response};
use hyper::body::Body;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Statistics for the HTTP front.
#[derive(Debug, Default)]
pub struct HttpStats {
    /// Total requests received.
    pub requests_total: AtomicU64,
    /// Successful responses (2xx).
    pub responses_2xx: AtomicU64,
    /// Client errors (4xx).
    pub responses_4xx: AtomicU64,
    /// Server errors (5xx).
    pub responses_5xx: AtomicU64,
    /// Active connections.
    pub active_connections: AtomicU64,
}

impl HttpStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response by status code.
    pub fn record_response(&self, status: u16) {
        match status {
            200..=299 => self.responses_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.responses_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.responses_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    /// Increment active connections.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Request entry point wiring the rate limiter in front of the load balancer.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    balancer: Arc<LoadBalancer>,
    rate_limit: RateLimitMiddleware,
    stats: Arc<HttpStats>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(balancer: Arc<LoadBalancer>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            balancer,
            rate_limit: RateLimitMiddleware::new(limiter),
            stats: Arc::new(HttpStats::new()),
        }
    }

    /// The load balancer behind this dispatcher.
    #[must_use]
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Front statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<HttpStats> {
        &self.stats
    }

    /// Handle one request from `remote`.
    ///
    /// Denied requests never reach the balancer.
    pub async fn handle<B>(&self, req: Request<B>, remote: Option<SocketAddr>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        self.stats.record_request();

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match self.rate_limit.before(remote).await {
            MiddlewareAction::Respond(response) => response,
            MiddlewareAction::Continue(ip) => self.balancer.dispatch(req, Some(ip)).await,
        };

        self.stats.record_response(response.status().as_u16());
        debug!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
}
