//! Single-operator credential resolution for `POST /v1/messages`.
//!
//! Replaces the reference codebase's per-client Bearer-token→profile map
//! (`client_auth.rs`): this service has one upstream credential, and the
//! priority chain in §6 picks which value actually goes out on the wire.

use axum::http::HeaderMap;

/// Resolve the API key to send upstream: configured `upstream_api_key`
/// first, then `X-Api-Key`, then `Authorization: Bearer …`. `None` if none
/// of the three are present.
pub fn resolve_api_key<'a>(config_key: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    config_key
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
}
