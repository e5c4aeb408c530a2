//! Load balancer configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Strategy name. Only `round_robin` is implemented.
    pub strategy: String,

    /// TOML file holding the `[[backends]]` list.
    pub backends_file: Option<PathBuf>,

    /// Backends declared inline (used when no backends file is set).
    pub backends: Vec<BackendEntry>,

    /// Interval of the background health sweep.
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// Reload the backends file when it changes on disk.
    pub watch_backends: bool,

    /// Poll interval of the backends file watcher.
    #[serde(with = "humantime_serde")]
    pub watch_interval: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            backends_file: None,
            backends: Vec::new(),
            health_check_interval: Duration::from_secs(10),
            watch_backends: false,
            watch_interval: Duration::from_secs(2),
        }
    }
}

/// One backend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEntry {
    /// Upstream URL, e.g. `http://127.0.0.1:8001`.
    pub url: String,
}

impl BackendEntry {
    /// Create a backend entry.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Contents of a backends file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendsFile {
    /// Backends in registration order.
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

/// Retry configuration used by the failover controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of recovery probes.
    pub max_attempts: u32,

    /// Base backoff unit.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Backoff ceiling.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Validate the retry configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_delay < self.delay {
            return Err("max_delay must not be smaller than delay".to_string());
        }
        Ok(())
    }
}

fn default_strategy() -> String {
    "round_robin".to_string()
}
