//! Starts one hello-world HTTP server per configured backend.

use anyhow::{Context, Result};
use argh::FromArgs;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use r0n_dispatcher::config::ConfigLoader;
use r0n_dispatcher::modules::load_balancer::parse_backend_url;
use r0n_dispatcher::modules::logging;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Fleet of demo backends for local testing.
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

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = Vec::new();

    for (index, entry) in config.balancer.backends.iter().enumerate() {
        let (_, address) = parse_backend_url(&entry.url)?;
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("binding {address}"))?;
        info!(url = %entry.url, index, "Backend started");
        servers.push(tokio::spawn(serve(listener, Arc::from(entry.url.as_str()), shutdown_rx.clone())));
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down servers");
    let _ = shutdown_tx.send(true);

    for server in servers {
        server.await?;
    }
    info!("All servers stopped");
    Ok(())
}

async fn serve(listener: TcpListener, url: Arc<str>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, remote_addr)) => {
                        debug!(%remote_addr, backend = %url, "New connection");
                        let url = Arc::clone(&url);
                        tokio::spawn(async move {
                            let service = service_fn(move |req| hello(req, Arc::clone(&url)));
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!("Connection error: {e}");
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {e}"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn hello(_req: Request<Incoming>, url: Arc<str>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(Response::new(Full::new(Bytes::from(format!(
        "Hello, you are on backend {url}"
    )))))
}
