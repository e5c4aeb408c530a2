//! Single-host HTTP reverse proxy bound to one backend.

use super::error::{LoadBalancerError, LoadBalancerResult};
use crate::modules::http_handler::response::{BoxError, ProxyBody};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme, Uri};
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Shared upstream client.
pub type HttpClient = Client<HttpConnector, ProxyBody>;

/// Build the shared upstream client.
#[must_use]
pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that apply to a single connection and are not forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Parse and check a backend URL.
///
/// Only plain `http` targets are accepted; a missing port defaults to 80.
pub fn parse_backend_url(url: &str) -> LoadBalancerResult<(Uri, String)> {
    let invalid = |reason: &str| LoadBalancerError::InvalidBackendUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.trim().parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;

    match uri.scheme_str() {
        Some("http") => {},
        Some(other) => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        None => return Err(invalid("missing scheme")),
    }

    let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
    if authority.host().is_empty() {
        return Err(invalid("missing host"));
    }

    let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));
    Ok((uri, address))
}

/// Forwarding handle for one upstream.
#[derive(Clone)]
pub struct ReverseProxy {
    scheme: Scheme,
    authority: Authority,
    client: HttpClient,
    timeout: Duration,
}

impl std::fmt::Debug for ReverseProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseProxy")
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReverseProxy {
    /// Create a proxy targeting the scheme and authority of `target`.
    pub fn new(target: &Uri, client: HttpClient, timeout: Duration) -> LoadBalancerResult<Self> {
        let missing = |part: &str| LoadBalancerError::InvalidBackendUrl {
            url: target.to_string(),
            reason: format!("missing {part}"),
        };

        Ok(Self {
            scheme: target.scheme().cloned().ok_or_else(|| missing("scheme"))?,
            authority: target.authority().cloned().ok_or_else(|| missing("host"))?,
            client,
            timeout,
        })
    }

    /// Upstream authority.
    #[must_use]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Forward `req` upstream and return the upstream response.
    ///
    /// Transport failures and timeouts are returned as [`LoadBalancerError::Proxy`].
    pub async fn forward<B>(
        &self,
        req: Request<B>,
        client_ip: Option<IpAddr>,
    ) -> LoadBalancerResult<Response<ProxyBody>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        parts.uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| LoadBalancerError::Proxy(e.to_string()))?;

        strip_hop_by_hop(&mut parts.headers);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut parts.headers, ip);
        }

        let body: ProxyBody = body.map_err(Into::into).boxed_unsync();
        let upstream = Request::from_parts(parts, body);

        debug!(uri = %upstream.uri(), method = %upstream.method(), "Forwarding request");

        let response = tokio::time::timeout(self.timeout, self.client.request(upstream))
            .await
            .map_err(|_| {
                LoadBalancerError::Proxy(format!(
                    "upstream {} timed out after {}ms",
                    self.authority,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| LoadBalancerError::Proxy(format!("upstream {}: {e}", self.authority)))?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(
            parts,
            body.map_err(BoxError::from).boxed_unsync(),
        ))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are hop-by-hop as well.
    let named: Vec<HeaderName> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_url() {
        let (uri, address) = parse_backend_url("http://127.0.0.1:8001").unwrap();
        assert_eq!(uri.host(), Some("127.0.0.1"));
        assert_eq!(address, "127.0.0.1:8001");

        let (_, address) = parse_backend_url("http://backend.local").unwrap();
        assert_eq!(address, "backend.local:80");
    }

    #[test]
    fn test_parse_backend_url_rejects() {
        assert!(matches!(
            parse_backend_url("not a url"),
            Err(LoadBalancerError::InvalidBackendUrl { .. })
        ));
        assert!(matches!(
            parse_backend_url("127.0.0.1:8001"),
            Err(LoadBalancerError::InvalidBackendUrl { .. })
        ));
        assert!(matches!(
            parse_backend_url("https://127.0.0.1:8443"),
            Err(LoadBalancerError::InvalidBackendUrl { .. })
        ));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-session"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("x-request-id", HeaderValue::from_static("42"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-session").is_none());
        assert_eq!(headers.get("x-request-id").unwrap(), "42");
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1".parse().unwrap());
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2".parse().unwrap());
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1, 10.0.0.2");
    }
}
