//! Token bucket record shared through the bucket store.

use super::error::{RateLimitError, RateLimitResult};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix of every bucket key in the store.
pub const KEY_PREFIX: &str = "ratelimit:bucket:";

/// Store key for a client key.
#[must_use]
pub fn bucket_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

/// Current time in unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Tokens available at `now`: `min(capacity, tokens + floor(elapsed * rate))`.
///
/// Elapsed time before `last_refill` counts as zero, so the result is
/// never below the stored count and never above `capacity`.
#[must_use]
pub fn refilled_tokens(tokens: i64, capacity: i64, refill_rate: i64, last_refill: i64, now: i64) -> i64 {
    let elapsed = now.saturating_sub(last_refill).max(0);
    let added = elapsed.saturating_mul(refill_rate);
    capacity.min(tokens.saturating_add(added))
}

/// A per-client token bucket.
///
/// Field names in the store are `tokens`, `capacity`, `refil_rate` and
/// `last_refill` (unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Stored token count.
    pub tokens: i64,
    /// Maximum tokens.
    pub capacity: i64,
    /// Tokens added per second.
    pub refill_rate: i64,
    /// Unix seconds of the last materialized refill.
    pub last_refill: i64,
}

impl Bucket {
    /// Create a bucket; `tokens` is clamped to `0..=capacity`.
    #[must_use]
    pub fn new(capacity: i64, refill_rate: i64, tokens: i64, now: i64) -> Self {
        let capacity = capacity.max(0);
        Self {
            tokens: tokens.clamp(0, capacity),
            capacity,
            refill_rate: refill_rate.max(0),
            last_refill: now,
        }
    }

    /// Tokens available at `now` without mutating the bucket.
    #[must_use]
    pub fn available(&self, now: i64) -> i64 {
        refilled_tokens(self.tokens, self.capacity, self.refill_rate, self.last_refill, now)
    }

    /// Apply the refill at `now`.
    ///
    /// Returns `false` and leaves the bucket untouched when no tokens would be added.
    pub fn refill(&mut self, now: i64) -> bool {
        let available = self.available(now);
        if available > self.tokens {
            self.tokens = available;
            self.last_refill = now;
            true
        } else {
            false
        }
    }

    /// Take one token at `now`.
    ///
    /// The clock is advanced either way.
    pub fn try_take(&mut self, now: i64) -> bool {
        let available = self.available(now);
        self.last_refill = now;
        if available >= 1 {
            self.tokens = available - 1;
            true
        } else {
            false
        }
    }

    /// Decode a bucket from its stored hash fields.
    ///
    /// An empty map means the bucket does not exist.
    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> RateLimitResult<Self> {
        if fields.is_empty() {
            return Err(RateLimitError::BucketNotFound(key.to_string()));
        }

        let field = |name: &str| -> RateLimitResult<i64> {
            let raw = fields
                .get(name)
                .ok_or_else(|| RateLimitError::InvalidBucket(format!("{key}: missing field '{name}'")))?;
            raw.trim()
                .parse()
                .map_err(|e| RateLimitError::InvalidBucket(format!("{key}: field '{name}' = '{raw}': {e}")))
        };

        Ok(Self {
            tokens: field("tokens")?,
            capacity: field("capacity")?,
            refill_rate: field("refil_rate")?,
            last_refill: field("last_refill")?,
        })
    }
}
