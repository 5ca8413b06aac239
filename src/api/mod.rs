//! HTTP surface — router assembly plus the concerns middleware handles.

pub mod auth;
pub mod handlers;
pub mod request_id;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Build the single axum router this service exposes (§6).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/v1/messages", post(handlers::messages))
        .route("/v1/messages/count_tokens", post(handlers::count_tokens))
        .route("/v1/models", get(handlers::list_models))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
