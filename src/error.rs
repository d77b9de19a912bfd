use axum::Json;
use axum::response::{IntoResponse, Response};
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Errors the HTTP surface can return. Every variant maps to a JSON body
/// with an `error` field; internal detail never reaches the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("can't find dag {0}")]
    DagNotFound(String),

    #[error("upstream unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::DagNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
