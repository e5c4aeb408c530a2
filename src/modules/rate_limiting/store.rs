//! Bucket store protocol and the in-process store.

use super::bucket::{unix_now, Bucket};
use super::error::{RateLimitError, RateLimitResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Atomic bucket operations against a shared store.
///
/// Every mutating call must be a single atomic step at the store so that
/// concurrent callers racing on the same key never lose updates.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Overwrite the bucket for `key` with `last_refill = now`.
    async fn create_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_rate: i64,
        tokens: i64,
    ) -> RateLimitResult<()>;

    /// Read the stored bucket; [`RateLimitError::BucketNotFound`] when absent.
    async fn bucket(&self, key: &str) -> RateLimitResult<Bucket>;

    /// Refill lazily and take one token in one step.
    ///
    /// Returns whether a token was granted.
    async fn decrease(&self, key: &str) -> RateLimitResult<bool>;

    /// Apply the refill formula to every bucket, skipping buckets that gain nothing.
    ///
    /// Returns the number of buckets written.
    async fn refill_all_buckets(&self, now: i64) -> RateLimitResult<usize>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// In-process bucket store.
///
/// Each operation runs inside one mutex critical section, which gives the
/// same per-key linearizability as the server-side scripts of a shared store.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryBucketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store holds no buckets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Insert a bucket as-is.
    pub fn insert(&self, key: &str, bucket: Bucket) {
        self.lock().insert(key.to_string(), bucket);
    }

    /// Decrease at an explicit time.
    pub fn decrease_at(&self, key: &str, now: i64) -> RateLimitResult<bool> {
        let mut buckets = self.lock();
        let bucket = buckets
            .get_mut(key)
            .ok_or_else(|| RateLimitError::BucketNotFound(key.to_string()))?;
        Ok(bucket.try_take(now))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn create_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_rate: i64,
        tokens: i64,
    ) -> RateLimitResult<()> {
        self.insert(key, Bucket::new(capacity, refill_rate, tokens, unix_now()));
        Ok(())
    }

    async fn bucket(&self, key: &str) -> RateLimitResult<Bucket> {
        self.lock()
            .get(key)
            .copied()
            .ok_or_else(|| RateLimitError::BucketNotFound(key.to_string()))
    }

    async fn decrease(&self, key: &str) -> RateLimitResult<bool> {
        self.decrease_at(key, unix_now())
    }

    async fn refill_all_buckets(&self, now: i64) -> RateLimitResult<usize> {
        let mut written = 0;
        for bucket in self.lock().values_mut() {
            if bucket.refill(now) {
                written += 1;
            }
        }
        Ok(written)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
