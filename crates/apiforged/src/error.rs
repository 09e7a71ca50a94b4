//! API errors with `{error}` JSON bodies.

use apiforge_core::ForgeError;
use apiforge_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Request failures, each mapped to one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    UpstreamTimeout(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => ApiError::NotFound(format!("not found: {key}")),
            StoreError::InvalidKey(key) => ApiError::BadRequest(format!("invalid name: {key}")),
            StoreError::Backend(msg) if msg.contains("timed out") => ApiError::UpstreamTimeout(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ForgeError> for ApiError {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ForgeError::Serialization(e) => ApiError::BadRequest(e.to_string()),
            ForgeError::Store(e) => e.into(),
            ForgeError::Config(msg) => ApiError::Internal(msg),
            upstream @ (ForgeError::Transport(_)
            | ForgeError::FunctionNotFound(_)
            | ForgeError::Signature(_)
            | ForgeError::Credentials(_)
            | ForgeError::HttpStatus { .. }) => ApiError::Upstream(upstream.to_string()),
        }
    }
}
