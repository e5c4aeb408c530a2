//! Response bodies and the fixed boundary responses.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

/// Boxed error carried by proxied bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type used for every response the dispatcher produces.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

/// Body of a rate-limited response.
pub const RATE_LIMITED_BODY: &str = r#"{"code":"429","error":"Rate limit exceeded"}"#;

/// Text of the 503 sent when the backend set is empty.
pub const NO_BACKENDS_BODY: &str = "No backends available";

/// Text of the 503 sent when every backend is dead.
pub const ALL_BACKENDS_DOWN_BODY: &str = "All backends are unavailable";

/// Wrap a full buffer as a [`ProxyBody`].
#[must_use]
pub fn full(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<ProxyBody> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// 429 with the fixed JSON body.
#[must_use]
pub fn too_many_requests() -> Response<ProxyBody> {
    let mut response = Response::new(full(RATE_LIMITED_BODY));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 500 sent when the client address cannot be determined.
#[must_use]
pub fn internal_error() -> Response<ProxyBody> {
    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// 503 for an empty backend set.
#[must_use]
pub fn no_backends() -> Response<ProxyBody> {
    text(StatusCode::SERVICE_UNAVAILABLE, NO_BACKENDS_BODY)
}

/// 503 when no backend is alive.
#[must_use]
pub fn all_backends_unavailable() -> Response<ProxyBody> {
    text(StatusCode::SERVICE_UNAVAILABLE, ALL_BACKENDS_DOWN_BODY)
}

/// 503 naming the backend whose recovery failed, by the host of its URL.
#[must_use]
pub fn backend_unavailable(host: &str) -> Response<ProxyBody> {
    text(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("Backend {host} is unavailable"),
    )
}

/// 502 for a request whose backend failed but has since recovered.
#[must_use]
pub fn bad_gateway() -> Response<ProxyBody> {
    text(StatusCode::BAD_GATEWAY, "Bad gateway")
}
