//! OpenRouter chat-completions adapter — the only outbound HTTP client this
//! service talks to.
//!
//! Grounded in the reference codebase's `backends/openai.rs`: two separate
//! `reqwest::Client`s, one carrying the configured request timeout for
//! buffered calls, one with no request-level timeout for streamed calls
//! (per §5's split-client rationale — a single long read deadline would
//! truncate slow-but-healthy generations).

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Response};
use serde_json::Value;

/// No request-level timeout on the streaming client; this is the shared
/// connect timeout both clients use.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Adapter for the configured OpenRouter (or any OpenAI-compatible)
/// upstream. Built once at startup and shared across requests — `Client` is
/// internally pooled and cheap to clone.
///
/// Carries no default `Authorization` header: the credential to send is
/// resolved per request (see `api::auth::resolve_api_key`) and passed to
/// `chat_completions`/`chat_completions_stream` explicitly. A client-level
/// default would double up with that per-request value — `RequestBuilder`
/// appends rather than replaces — producing two `Authorization` headers on
/// the wire.
pub struct OpenRouterClient {
    /// Buffered requests — has the configured request timeout.
    client: Client,
    /// Streaming requests — no request-level timeout (body arrives incrementally).
    stream_client: Client,
    base_url: String,
}

impl OpenRouterClient {
    /// Build a client for `base_url`. Carries no credentials of its own —
    /// every call site supplies the resolved API key per request.
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        let stream_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build streaming reqwest client");

        Self { client, stream_client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// `POST {base_url}/chat/completions`, buffered, sending `api_key` as a
    /// bearer token when present.
    pub async fn chat_completions(&self, body: &Value, api_key: Option<&str>) -> anyhow::Result<Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }
        request.send().await.with_context(|| format!("POST {url}"))
    }

    /// `POST {base_url}/chat/completions`, returning the raw streaming
    /// response for the caller to inspect the status before consuming the
    /// body — a non-success status must become a single SSE error frame,
    /// never a translated event stream.
    pub async fn chat_completions_stream(
        &self,
        body: &Value,
        api_key: Option<&str>,
    ) -> anyhow::Result<Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.stream_client.post(&url).json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }
        request.send().await.with_context(|| format!("POST {url} (streaming)"))
    }
}
