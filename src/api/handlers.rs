//! Request handlers wiring the translation core to HTTP.
//!
//! Thin by design — matching the reference codebase's `api/client.rs`: all
//! interesting logic lives in [`crate::translate`] and [`crate::stream`];
//! handlers only extract the request, pick the streaming or non-streaming
//! path, and shape the HTTP response.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt as _;
use serde_json::{json, Value};

use crate::api::auth::resolve_api_key;
use crate::error::AppError;
use crate::proto::anthropic::{CountTokensRequest, MessagesRequest};
use crate::proto::openai::CompletionResponse;
use crate::state::AppState;
use crate::translate::{estimate_tokens, openai_to_anthropic, translate_request};

/// `GET /` — service identity probe. Touches neither the registry nor the
/// upstream, per §6.
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /v1/models` — the registry's cached catalogue, fetched on demand
/// only if it has never successfully populated. A catalogue that is
/// legitimately empty (a successful fetch returning zero models) is still
/// cached, not re-fetched on every call.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    if !state.registry.has_fetched() {
        state
            .registry
            .fetch(&state.registry_http, &state.config.upstream_base_url)
            .await
            .map_err(AppError::Internal)?;
    }
    let snapshot = state.registry.snapshot().await;
    Ok(Json(snapshot.raw().clone()))
}

/// `POST /v1/messages/count_tokens`.
pub async fn count_tokens(Json(body): Json<CountTokensRequest>) -> impl IntoResponse {
    Json(json!({ "input_tokens": estimate_tokens(&body.system, &body.messages) }))
}

/// `POST /v1/messages` — the core proxy path. Dispatches to the streaming or
/// non-streaming translator based on `body.stream`.
pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MessagesRequest>,
) -> Result<Response, AppError> {
    let api_key = resolve_api_key(state.config.upstream_api_key.as_deref(), &headers)
        .map(str::to_string)
        .ok_or(AppError::MissingCredentials)?;

    let snapshot = state.registry.snapshot().await;
    let estimated_input_tokens = estimate_tokens(&body.system, &body.messages);
    let translated = translate_request(&body, state.config.model_override.as_deref(), snapshot.aliases());
    let model = translated.model.clone();
    let is_streaming = translated.stream;

    tracing::info!(model = %model, stream = is_streaming, "translated request");

    let payload = serde_json::to_value(&translated).map_err(|e| AppError::MalformedRequest(e.to_string()))?;

    if is_streaming {
        streaming_response(&state, &payload, Some(&api_key), model, estimated_input_tokens).await
    } else {
        non_streaming_response(&state, &payload, Some(&api_key), model).await
    }
}

async fn non_streaming_response(
    state: &AppState,
    payload: &Value,
    api_key: Option<&str>,
    model: String,
) -> Result<Response, AppError> {
    let response = state.upstream.chat_completions(payload, api_key).await.map_err(AppError::Internal)?;
    let status = response.status();
    let body = response.text().await.map_err(|e| AppError::Internal(e.into()))?;

    if !status.is_success() {
        tracing::warn!(%status, "upstream call failed");
        return Err(AppError::Upstream { status, body });
    }

    let completion: CompletionResponse =
        serde_json::from_str(&body).map_err(|e| AppError::Internal(anyhow::anyhow!("parsing upstream response: {e}")))?;
    let anthropic = openai_to_anthropic(&completion, &model);
    Ok((StatusCode::OK, Json(anthropic)).into_response())
}

async fn streaming_response(
    state: &AppState,
    payload: &Value,
    api_key: Option<&str>,
    model: String,
    estimated_input_tokens: u64,
) -> Result<Response, AppError> {
    let response =
        state.upstream.chat_completions_stream(payload, api_key).await.map_err(AppError::Internal)?;
    let status = response.status();

    if !status.is_success() {
        tracing::warn!(%status, "upstream streaming call failed");
        let body = response.text().await.unwrap_or_default();
        let frame = crate::stream::error_frame(&body);
        return Ok((
            status,
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from(frame),
        )
            .into_response());
    }

    let upstream: crate::backends::SseStream =
        Box::pin(response.bytes_stream().map(|r| r.map_err(anyhow::Error::from)));
    let translated = crate::stream::translate_stream(upstream, model, estimated_input_tokens);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(translated.map(Ok::<_, std::io::Error>)),
    )
        .into_response())
}
