//! R0N Dispatcher binary entry point.

use anyhow::{Context, Result};
use argh::FromArgs;
use r0n_dispatcher::config::{BackendsWatcher, ConfigLoader, DispatcherConfig};
use r0n_dispatcher::modules::http_handler::{Dispatcher, HttpListener};
use r0n_dispatcher::modules::load_balancer::LoadBalancer;
use r0n_dispatcher::modules::logging;
use r0n_dispatcher::modules::rate_limiting::{
    BucketStore, MemoryBucketStore, RateLimiter, StoreConfig, StoreKind,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Round-robin reverse-proxy dispatcher with per-client rate limiting.
#[derive(FromArgs)]
struct Args {
    /// path to the configuration file
    #[argh(option, short = 'c', default = "PathBuf::from(\"configs/config.toml\")")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let config = ConfigLoader::new()
        .load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    logging::init(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting dispatcher"
    );

    run(config).await
}

async fn run(config: DispatcherConfig) -> Result<()> {
    let store = connect_store(&config.store).await?;
    let limiter = Arc::new(RateLimiter::new(store, config.bucket.clone()));

    let balancer = Arc::new(
        LoadBalancer::from_config(&config.balancer, config.retry)?
            .with_upstream_timeout(config.http.write_timeout),
    );
    if balancer.backend_count() == 0 {
        warn!("Starting without backends");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = vec![
        balancer.spawn_health_checks(config.balancer.health_check_interval, shutdown_rx.clone()),
        limiter.spawn_refill_task(shutdown_rx.clone()),
    ];

    if config.balancer.watch_backends {
        if let Some(path) = &config.balancer.backends_file {
            let watcher =
                BackendsWatcher::new(path, config.balancer.watch_interval, Arc::clone(&balancer));
            tasks.push(watcher.spawn(shutdown_rx.clone()));
        }
    }

    let dispatcher = Dispatcher::new(Arc::clone(&balancer), Arc::clone(&limiter));
    let stats = Arc::clone(dispatcher.stats());
    let listener = HttpListener::bind(&config.http, dispatcher).await?;
    let server = tokio::spawn(listener.serve(shutdown_rx));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    server.await??;
    for task in tasks {
        task.await?;
    }

    let (checked, allowed, denied) = limiter.stats().snapshot();
    let (selections, selected, unavailable) = balancer.stats().snapshot();
    info!(
        requests = stats.requests_total.load(Ordering::Relaxed),
        checked,
        allowed,
        denied,
        selections,
        selected,
        unavailable,
        "Dispatcher stopped"
    );
    Ok(())
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn BucketStore>> {
    match config.kind {
        StoreKind::Memory => {
            warn!("Using in-process bucket store; limits are not shared between instances");
            Ok(Arc::new(MemoryBucketStore::new()))
        },
        StoreKind::Redis => redis_store(config).await,
    }
}

#[cfg(feature = "redis-backend")]
async fn redis_store(config: &StoreConfig) -> Result<Arc<dyn BucketStore>> {
    use r0n_dispatcher::modules::rate_limiting::RedisBucketStore;

    let store = RedisBucketStore::connect(config)
        .await
        .with_context(|| format!("connecting to redis at {}", config.addr))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-backend"))]
async fn redis_store(_config: &StoreConfig) -> Result<Arc<dyn BucketStore>> {
    anyhow::bail!("store kind \"redis\" requires the redis-backend feature")
}
