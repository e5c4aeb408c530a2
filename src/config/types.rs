//! Configuration type definitions.

use crate::modules::http_handler::HttpConfig;
use crate::modules::load_balancer::{BalancerConfig, RetryConfig};
use crate::modules::logging::LoggingConfig;
use crate::modules::rate_limiting::{BucketConfig, StoreConfig};
use serde::{Deserialize, Serialize};

/// Root configuration structure for the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// HTTP listener.
    pub http: HttpConfig,

    /// Failover retry policy.
    pub retry: RetryConfig,

    /// Backend selection and health checking.
    pub balancer: BalancerConfig,

    /// Per-client token bucket defaults.
    pub bucket: BucketConfig,

    /// Bucket store connection.
    pub store: StoreConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}
