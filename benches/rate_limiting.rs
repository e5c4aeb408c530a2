//! Benchmarks for the Rate Limiting module.
//!
//! Tests: bucket arithmetic, memory store decrement, limiter check,
//! refill sweep over many buckets.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use r0n_dispatcher::modules::rate_limiting::{
    unix_now, Bucket, BucketConfig, BucketStore, MemoryBucketStore, RateLimiter,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn bench_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime for benchmarks")
}

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

fn bench_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiting/bucket");
    let now = unix_now();

    group.bench_function("try_take", |b| {
        let mut bucket = Bucket::new(1_000_000, 1000, 1_000_000, now);
        b.iter(|| black_box(bucket.try_take(now)));
    });

    group.bench_function("available", |b| {
        let bucket = Bucket::new(10_000, 10, 0, now - 60);
        b.iter(|| black_box(bucket.available(now)));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

fn bench_memory_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiting/memory_store");
    let now = unix_now();

    group.bench_function("decrease_at", |b| {
        let store = MemoryBucketStore::new();
        store.insert("client", Bucket::new(1_000_000, 1_000_000, 1_000_000, now));
        b.iter(|| black_box(store.decrease_at("client", now)));
    });

    let rt = bench_runtime();
    for buckets in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("refill_all", buckets), &buckets, |b, &buckets| {
            let store = MemoryBucketStore::new();
            for i in 0..buckets {
                store.insert(&format!("10.0.{}.{}", i / 250, i % 250), Bucket::new(10, 1, 0, now));
            }
            let mut t = now;
            b.to_async(&rt).iter(|| {
                t += 1;
                let store = &store;
                async move { black_box(store.refill_all_buckets(t).await) }
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

fn bench_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiting/limiter");
    let rt = bench_runtime();

    let config = BucketConfig {
        capacity: i64::MAX / 2,
        refill_rate: 0,
        refill_time: Duration::from_secs(1),
        tokens: i64::MAX / 2,
        charge_first_request: true,
    };

    group.bench_function("allow_single_client", |b| {
        let limiter = RateLimiter::new(Arc::new(MemoryBucketStore::new()), config.clone());
        b.to_async(&rt).iter(|| async { black_box(limiter.allow("203.0.113.7").await) });
    });

    group.bench_function("allow_many_clients", |b| {
        let limiter = RateLimiter::new(Arc::new(MemoryBucketStore::new()), config.clone());
        let mut i = 0u32;
        b.to_async(&rt).iter(|| {
            i = i.wrapping_add(1);
            let key = format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff);
            let limiter = &limiter;
            async move { black_box(limiter.allow(&key).await) }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_bucket, bench_memory_store, bench_limiter);
criterion_main!(benches);
