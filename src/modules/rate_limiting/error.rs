//! Error types for rate limiting.

use thiserror::Error;

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors that can occur during rate limiting.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// No bucket exists for the key.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The bucket store failed.
    #[error("bucket store error: {0}")]
    Store(String),

    /// Stored bucket fields are missing or malformed.
    #[error("invalid bucket data: {0}")]
    InvalidBucket(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RateLimitError {
    /// Check if the error means the bucket does not exist yet.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BucketNotFound(_))
    }

    /// Check if the error indicates a configuration problem.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}
