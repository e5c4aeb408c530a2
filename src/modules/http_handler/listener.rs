//! HTTP/1.1 accept loop.

use super::config::HttpConfig;
use super::error::{HttpError, HttpResult};
use super::handler::Dispatcher;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bound HTTP listener feeding a [`Dispatcher`].
#[derive(Debug)]
pub struct HttpListener {
    listener: TcpListener,
    dispatcher: Dispatcher,
    read_timeout: Duration,
}

impl HttpListener {
    /// Bind the configured address.
    pub async fn bind(config: &HttpConfig, dispatcher: Dispatcher) -> HttpResult<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HttpError::Bind { addr, source })?;

        Ok(Self {
            listener,
            dispatcher,
            read_timeout: config.read_timeout,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> HttpResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` flips.
    ///
    /// Open connections finish their in-flight request before closing.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> HttpResult<()> {
        info!(addr = %self.local_addr()?, "Dispatcher listening");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, remote_addr)) => {
                            debug!(%remote_addr, "New connection");
                            tokio::spawn(serve_connection(
                                stream,
                                remote_addr,
                                self.dispatcher.clone(),
                                self.read_timeout,
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => accept_backoff(&e).await,
                    }
                }
                _ = shutdown.changed() => {
                    info!("HTTP listener shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Log an accept failure and wait before the next attempt.
///
/// Errors such as `EMFILE` persist until a descriptor frees up.
async fn accept_backoff(e: &std::io::Error) {
    error!(error = %e, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "Accept error");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    dispatcher: Dispatcher,
    read_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let stats = std::sync::Arc::clone(dispatcher.stats());
    stats.connection_opened();

    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<_, Infallible>(dispatcher.handle(req, Some(remote_addr)).await) }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(%remote_addr, "Connection error: {e}");
    }
    stats.connection_closed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::{LoadBalancer, RetryPolicy};
    use crate::modules::rate_limiting::{BucketConfig, MemoryBucketStore, RateLimiter};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(LoadBalancer::new(RetryPolicy::default())),
            Arc::new(RateLimiter::new(
                Arc::new(MemoryBucketStore::new()),
                BucketConfig::default(),
            )),
        )
    }

    fn loopback_config() -> HttpConfig {
        HttpConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_serves_and_shuts_down() {
        let listener = HttpListener::bind(&loopback_config(), dispatcher()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(listener.serve(shutdown_rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 503"));
        assert!(raw.ends_with("No backends available"));

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let start = tokio::time::Instant::now();
        let err = std::io::Error::from_raw_os_error(24);
        accept_backoff(&err).await;
        assert!(start.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = HttpListener::bind(&loopback_config(), dispatcher()).await.unwrap();
        let config = HttpConfig {
            listen_port: first.local_addr().unwrap().port(),
            ..loopback_config()
        };
        let err = HttpListener::bind(&config, dispatcher()).await.unwrap_err();
        assert!(matches!(err, HttpError::Bind { .. }));
    }
}
