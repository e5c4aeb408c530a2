//! Load balancer error types.

use thiserror::Error;

/// Errors that can occur in the load balancer module.
#[derive(Debug, Error)]
pub enum LoadBalancerError {
    /// The backend set is empty.
    #[error("no backends available")]
    NoBackendsAvailable,

    /// Every registered backend is marked dead.
    #[error("all backends are unavailable")]
    NoHealthyBackends,

    /// A liveness probe could not reach the backend.
    #[error("backend {0} is unavailable")]
    BackendUnavailable(String),

    /// A backend URL could not be parsed.
    #[error("invalid backend url '{url}': {reason}")]
    InvalidBackendUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configured strategy name is unknown.
    #[error("balancer strategy not found: {0}")]
    StrategyNotFound(String),

    /// The strategy is known but has no implementation.
    #[error("balancer strategy not implemented: {0}")]
    StrategyNotImplemented(String),

    /// Forwarding a request to the upstream failed.
    #[error("proxy error: {0}")]
    Proxy(String),
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;
