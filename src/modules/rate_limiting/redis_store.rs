//! Redis-backed bucket store.
//!
//! Buckets are hashes under `ratelimit:bucket:<key>`. Every read-modify-write
//! runs as a Lua script so it executes atomically on the server.

use super::bucket::{bucket_key, unix_now, Bucket, KEY_PREFIX};
use super::config::StoreConfig;
use super::error::{RateLimitError, RateLimitResult};
use super::store::BucketStore;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Keys requested per SCAN page.
const SCAN_PAGE: usize = 100;

/// Decrease result for a missing hash.
const NOT_FOUND: i64 = -1;

const DECREASE_SCRIPT: &str = r"
local data = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill', 'capacity', 'refil_rate')
if not data[1] then
    return -1
end

local tokens = tonumber(data[1])
local last_refill = tonumber(data[2])
local capacity = tonumber(data[3])
local refil_rate = tonumber(data[4])

local now = tonumber(ARGV[1])
local elapsed = math.max(0, now - last_refill)
local available = math.min(capacity, tokens + math.floor(elapsed * refil_rate))

if available >= 1 then
    redis.call('HSET', KEYS[1], 'tokens', available - 1, 'last_refill', now)
    return 1
end

redis.call('HSET', KEYS[1], 'last_refill', now)
return 0
";

const REFILL_SCRIPT: &str = r"
local data = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill', 'capacity', 'refil_rate')
local tokens = tonumber(data[1])
local last_refill = tonumber(data[2])
local capacity = tonumber(data[3])
local refil_rate = tonumber(data[4])

if not (tokens and last_refill and capacity and refil_rate) then
    return 0
end

local now = tonumber(ARGV[1])
local elapsed = math.max(0, now - last_refill)
local refilled = math.min(capacity, tokens + math.floor(elapsed * refil_rate))

if refilled > tokens then
    redis.call('HSET', KEYS[1], 'tokens', refilled, 'last_refill', now)
    return 1
end
return 0
";

/// Bucket store shared by every dispatcher pointing at the same redis.
#[derive(Clone)]
pub struct RedisBucketStore {
    conn: MultiplexedConnection,
    decrease: Script,
    refill: Script,
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore").finish_non_exhaustive()
    }
}

impl RedisBucketStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(config: &StoreConfig) -> RateLimitResult<Self> {
        let store = Self::open(&config.redis_url()).await?;
        info!(addr = %config.addr, db = config.db, "Connected to redis bucket store");
        Ok(store)
    }

    /// Connect to a `redis://` URL and verify the server answers `PING`.
    pub async fn open(url: &str) -> RateLimitResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            conn,
            decrease: Script::new(DECREASE_SCRIPT),
            refill: Script::new(REFILL_SCRIPT),
        })
    }

    /// Write a bucket as-is, overwriting any existing one.
    pub async fn insert(&self, key: &str, bucket: Bucket) -> RateLimitResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("HSET")
            .arg(bucket_key(key))
            .arg("tokens")
            .arg(bucket.tokens)
            .arg("capacity")
            .arg(bucket.capacity)
            .arg("refil_rate")
            .arg(bucket.refill_rate)
            .arg("last_refill")
            .arg(bucket.last_refill)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Decrease at an explicit time.
    pub async fn decrease_at(&self, key: &str, now: i64) -> RateLimitResult<bool> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .decrease
            .key(bucket_key(key))
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => Ok(true),
            0 => Ok(false),
            NOT_FOUND => Err(RateLimitError::BucketNotFound(key.to_string())),
            other => Err(RateLimitError::Store(format!(
                "unexpected decrease result {other}"
            ))),
        }
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn create_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_rate: i64,
        tokens: i64,
    ) -> RateLimitResult<()> {
        self.insert(key, Bucket::new(capacity, refill_rate, tokens, unix_now())).await
    }

    async fn bucket(&self, key: &str) -> RateLimitResult<Bucket> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(bucket_key(key))
            .query_async(&mut conn)
            .await?;
        Bucket::from_fields(key, &fields)
    }

    async fn decrease(&self, key: &str) -> RateLimitResult<bool> {
        self.decrease_at(key, unix_now()).await
    }

    async fn refill_all_buckets(&self, now: i64) -> RateLimitResult<usize> {
        let mut conn = self.conn.clone();
        let pattern = format!("{KEY_PREFIX}*");
        let mut cursor: u64 = 0;
        let mut written = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;

            for key in &keys {
                let result: redis::RedisResult<i64> =
                    self.refill.key(key).arg(now).invoke_async(&mut conn).await;
                match result {
                    Ok(1) => written += 1,
                    Ok(_) => {},
                    // One bad bucket does not abort the sweep.
                    Err(e) => error!(key = %key, error = %e, "Failed to refill bucket"),
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(written, "Refilled redis buckets");
        Ok(written)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    //! These run against the server named by `REDIS_URL` and return early
    //! when it is unset.

    use super::*;
    use std::sync::{Mutex, PoisonError};

    const T0: i64 = 1_700_000_000;

    // Refill sweeps touch every bucket in the database.
    static SERIAL: Mutex<()> = Mutex::new(());

    async fn store() -> Option<RedisBucketStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisBucketStore::open(&url).await.unwrap())
    }

    fn test_key(name: &str) -> String {
        format!("test-{}-{name}", std::process::id())
    }

    async fn remove(store: &RedisBucketStore, keys: &[String]) {
        let mut conn = store.conn.clone();
        let full: Vec<String> = keys.iter().map(|k| bucket_key(k)).collect();
        let _: () = redis::cmd("DEL").arg(full).query_async(&mut conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_decrease_applies_lazy_refill() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store().await else { return };
        let key = test_key("lazy");

        store.insert(&key, Bucket::new(10, 1, 0, T0)).await.unwrap();
        assert!(store.decrease_at(&key, T0 + 5).await.unwrap());

        let bucket = store.bucket(&key).await.unwrap();
        assert_eq!(bucket.tokens, 4);
        assert_eq!(bucket.last_refill, T0 + 5);

        remove(&store, &[key]).await;
    }

    #[tokio::test]
    async fn test_denied_decrease_advances_clock() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store().await else { return };
        let key = test_key("denied");

        store.insert(&key, Bucket::new(10, 0, 0, T0)).await.unwrap();
        assert!(!store.decrease_at(&key, T0 + 3).await.unwrap());

        let bucket = store.bucket(&key).await.unwrap();
        assert_eq!(bucket.tokens, 0);
        assert_eq!(bucket.last_refill, T0 + 3);

        remove(&store, &[key]).await;
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store().await else { return };
        let key = test_key("missing");
        remove(&store, std::slice::from_ref(&key)).await;

        assert!(matches!(
            store.decrease_at(&key, T0).await,
            Err(RateLimitError::BucketNotFound(ref k)) if *k == key
        ));
        assert!(matches!(
            store.bucket(&key).await,
            Err(RateLimitError::BucketNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_decrease_grants_one() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store().await else { return };
        let key = test_key("race");
        store.insert(&key, Bucket::new(10, 0, 1, T0)).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.decrease_at(&key, T0).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(store.bucket(&key).await.unwrap().tokens, 0);

        remove(&store, &[key]).await;
    }

    #[tokio::test]
    async fn test_refill_skips_buckets_without_gain() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store().await else { return };
        let full = test_key("full");
        let empty = test_key("empty");

        store.insert(&full, Bucket::new(5, 1, 5, T0)).await.unwrap();
        store.insert(&empty, Bucket::new(10, 2, 0, T0)).await.unwrap();

        let written = store.refill_all_buckets(T0 + 3).await.unwrap();
        assert!(written >= 1);

        assert_eq!(store.bucket(&full).await.unwrap(), Bucket::new(5, 1, 5, T0));
        let refilled = store.bucket(&empty).await.unwrap();
        assert_eq!(refilled.tokens, 6);
        assert_eq!(refilled.last_refill, T0 + 3);

        remove(&store, &[full, empty]).await;
    }

    #[tokio::test]
    async fn test_refill_walks_every_scan_page() {
        let _guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store().await else { return };
        let keys: Vec<String> = (0..SCAN_PAGE * 3).map(|i| test_key(&format!("page-{i}"))).collect();

        for key in &keys {
            store.insert(key, Bucket::new(10, 1, 0, T0)).await.unwrap();
        }
        let written = store.refill_all_buckets(T0 + 2).await.unwrap();
        assert!(written >= keys.len());

        for key in &keys {
            assert_eq!(store.bucket(key).await.unwrap().tokens, 2);
        }

        remove(&store, &keys).await;
    }
}
