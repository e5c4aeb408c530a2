//! Rate-limit admission in front of dispatch.

use super::response::{self, ProxyBody};
use crate::modules::rate_limiting::RateLimiter;
use http::Response;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

/// Action to take after middleware processing.
#[derive(Debug)]
pub enum MiddlewareAction {
    /// Continue to dispatch for this client.
    Continue(IpAddr),
    /// Short-circuit with a response.
    Respond(Response<ProxyBody>),
}

/// Per-client token-bucket check keyed by the peer IP.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Create the middleware.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Check the client behind `remote`.
    ///
    /// A missing peer address answers 500, a denied client 429.
    pub async fn before(&self, remote: Option<SocketAddr>) -> MiddlewareAction {
        let Some(remote) = remote else {
            error!("Failed to determine remote address");
            return MiddlewareAction::Respond(response::internal_error());
        };

        let ip = remote.ip();
        debug!(remote_addr = %remote, "Rate limit check");

        if self.limiter.allow(&ip.to_string()).await {
            MiddlewareAction::Continue(ip)
        } else {
            debug!(client = %ip, "Rate limit exceeded");
            MiddlewareAction::Respond(response::too_many_requests())
        }
    }
}
