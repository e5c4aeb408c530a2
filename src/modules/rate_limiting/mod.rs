//! # Rate Limiting Module
//!
//! Per-client token buckets kept in a bucket store that several dispatcher
//! processes can share.
//!
//! ## Features
//!
//! - **Lazy refill**: a bucket's tokens are recomputed from elapsed time on every decrement
//! - **Refill sweep**: a background task tops up idle buckets on a fixed cadence
//! - **Shared store**: redis with server-side Lua scripts, or an in-process store
//! - **Fail closed**: store errors deny the request
//!
//! ## Usage
//!
//! ```ignore
//! use r0n_dispatcher::modules::rate_limiting::{BucketConfig, MemoryBucketStore, RateLimiter};
//!
//! let limiter = RateLimiter::new(Arc::new(MemoryBucketStore::new()), BucketConfig::default());
//! if !limiter.allow("203.0.113.7").await {
//!     // Return 429 Too Many Requests
//! }
//! ```

mod bucket;
mod config;
mod error;
mod limiter;
#[cfg(feature = "redis-backend")]
mod redis_store;
mod store;

pub use bucket::{bucket_key, refilled_tokens, unix_now, Bucket, KEY_PREFIX};
pub use config::{BucketConfig, StoreConfig, StoreKind};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{RateLimitStats, RateLimiter};
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisBucketStore;
pub use store::{BucketStore, MemoryBucketStore};
