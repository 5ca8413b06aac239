//! Typed HTTP error type for the translation boundary.
//!
//! Every request handler returns `Result<T, AppError>`. Unlike a catch-all
//! `anyhow`-wrapping error, each variant here carries the HTTP status and
//! envelope shape §7 of the spec assigns to it — a missing-credentials
//! request is a 401, a malformed body is a 400, an upstream failure echoes
//! the upstream's own status code, and anything else internal collapses to
//! a 500. [`IntoResponse`] logs before responding, at `warn` for
//! client-attributable failures and `error` for internal ones.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("API key required")]
    MissingCredentials,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("upstream returned HTTP {status}")]
    Upstream { status: StatusCode, body: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingCredentials => {
                tracing::warn!("request rejected: missing credentials");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "API key required" } })),
                )
                    .into_response()
            }
            AppError::MalformedRequest(msg) => {
                tracing::warn!(error = %msg, "request rejected: malformed body");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": { "message": msg } })),
                )
                    .into_response()
            }
            AppError::Upstream { status, body } => {
                tracing::warn!(%status, "upstream call failed");
                (status, Json(json!({ "error": { "message": body } }))).into_response()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": { "message": err.to_string() } })),
                )
                    .into_response()
            }
        }
    }
}
