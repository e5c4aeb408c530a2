//! Configuration types for rate limiting.

use super::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults for newly created buckets and the refill sweep.
///
/// Key names follow the `[bucket]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum tokens per bucket.
    pub capacity: i64,

    /// Tokens added per second.
    #[serde(rename = "refil_rate", alias = "refill_rate")]
    pub refill_rate: i64,

    /// Interval of the refill sweep.
    #[serde(rename = "refil_time", alias = "refill_time", with = "humantime_serde")]
    pub refill_time: Duration,

    /// Tokens in a new bucket.
    pub tokens: i64,

    /// Debit the request that creates a bucket.
    pub charge_first_request: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 1,
            refill_time: Duration::from_secs(1),
            tokens: 10,
            charge_first_request: true,
        }
    }
}

impl BucketConfig {
    /// Validate the bucket configuration.
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.capacity <= 0 {
            return Err(RateLimitError::InvalidConfig(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.refill_rate < 0 {
            return Err(RateLimitError::InvalidConfig(
                "refil_rate must not be negative".to_string(),
            ));
        }
        if self.tokens < 0 || self.tokens > self.capacity {
            return Err(RateLimitError::InvalidConfig(format!(
                "tokens must be between 0 and capacity ({})",
                self.capacity
            )));
        }
        if self.refill_time.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "refil_time must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Tokens stored in a freshly created bucket.
    #[must_use]
    pub fn initial_tokens(&self) -> i64 {
        if self.charge_first_request {
            (self.tokens - 1).max(0)
        } else {
            self.tokens
        }
    }
}

/// Bucket store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Shared redis store.
    #[default]
    Redis,
    /// In-process store.
    Memory,
}

/// Bucket store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind.
    pub kind: StoreKind,

    /// Redis `host:port`.
    pub addr: String,

    /// Redis password; empty for none.
    pub password: String,

    /// Redis database index.
    pub db: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Redis,
            addr: "127.0.0.1:6379".to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

impl StoreConfig {
    /// Connection URL for the redis client.
    #[must_use]
    pub fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}
