use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Uri},
    middleware::Next,
    response::Response,
};
use tracing::Span;

use crate::config::Config;

/// Sets the four CORS headers on every response. `insert` semantics:
/// anything upstream already said about CORS is overwritten, never
/// merged, so the browser sees exactly one deterministic policy.
pub async fn apply_cors(
    State(config): State<Arc<Config>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut resp = next.run(req).await;

    let origin = HeaderValue::from_str(&config.allowed_origin)
        .unwrap_or_else(|_| HeaderValue::from_static("null"));

    let headers = resp.headers_mut();
    headers.insert("access-control-allow-origin", origin);
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );

    resp
}

pub async fn enrich_current_span_middleware(req: Request<Body>, next: Next) -> Response {
    let uri: &Uri = req.uri();

    let host = req
        .headers()
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("UNKNOWN");

    let current_span = Span::current();

    current_span.record("http.uri", uri.path());
    current_span.record("http.host", host);
    if let Some(query) = uri.query() {
        current_span.record("http.query", query);
    }

    next.run(req).await
}
