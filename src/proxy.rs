use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Uri, header};
use axum::response::{IntoResponse, Response};

use crate::config::Config;
use crate::error::ApiError;
use crate::server::middleware;

/// Bound on buffered request bodies. Metadata-plane payloads are small;
/// anything past this is not traffic this gateway is meant to carry.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct ProxyState {
    pub http_client: Arc<reqwest::Client>,
    pub config: Arc<Config>,
}

/// Every path and method funnels through the fallback, so CORS preflight
/// is forwarded like any other request.
pub fn build_router(state: ProxyState) -> Router {
    let config = state.config.clone();
    Router::new()
        .fallback(forward)
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(config, middleware::apply_cors))
        .layer(axum::middleware::from_fn(middleware::enrich_current_span_middleware))
}

/// Relays one request to the upstream control plane: same method, path,
/// query and body, with the configured credential swapped in. A transport
/// failure (refused, DNS, timeout) becomes a 502; nothing is retried.
#[tracing::instrument(skip_all, fields(http.method = %req.method(), http.path = %req.uri().path()))]
async fn forward(State(state): State<ProxyState>, req: Request) -> Result<Response, ApiError> {
    let method = req.method().clone();
    let target_url = build_target_url(&state.config.upstream_base_url, req.uri());
    let headers = prepare_headers(req.headers(), &state.config.upstream_auth_token);

    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(MAX_BODY_BYTES))?;

    tracing::debug!(url = %target_url, "forwarding to upstream");

    let upstream = state
        .http_client
        .request(method, &target_url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| ApiError::UpstreamUnavailable(e.to_string()))?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    // The body is re-framed from a buffered byte payload, so hop-by-hop
    // framing headers from upstream no longer apply.
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);
    headers.remove(header::CONTENT_LENGTH);

    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::UpstreamUnavailable(e.to_string()))?;

    Ok((status, headers, bytes).into_response())
}

fn build_target_url(base_url: &str, uri: &Uri) -> String {
    match uri.path_and_query() {
        Some(pq) => format!("{base_url}{pq}"),
        None => format!("{base_url}{}", uri.path()),
    }
}

/// Copies request headers for the upstream call, dropping the inbound
/// `host` and overwriting `authorization` with the configured credential.
fn prepare_headers(incoming: &HeaderMap, auth_token: &str) -> HeaderMap {
    let mut headers = incoming.clone();
    headers.remove(header::HOST);
    match HeaderValue::from_str(auth_token) {
        Ok(value) => {
            headers.insert(header::AUTHORIZATION, value);
        }
        Err(_) => {
            tracing::warn!("configured auth token is not a valid header value");
            headers.remove(header::AUTHORIZATION);
        }
    }
    headers
}
