//! Process-wide shared state — the config, the model registry, and the
//! outbound HTTP client, all handed to every request handler via axum's
//! `State` extractor.
//!
//! Grounded in the reference codebase's `RouterState`, trimmed to the one
//! upstream this service has: no traffic log, no per-client profile map, no
//! config hot-reload lock.

use std::sync::Arc;

use crate::backends::OpenRouterClient;
use crate::config::Config;
use crate::registry::ModelRegistry;

pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ModelRegistry,
    pub upstream: OpenRouterClient,
    /// A second, independent `reqwest::Client` used only for the registry's
    /// own `GET /models` fetch — kept separate from [`OpenRouterClient`]'s
    /// internal pair so a re-fetch never contends with in-flight chat
    /// completions for connection-pool slots.
    pub registry_http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let upstream = OpenRouterClient::new(config.upstream_base_url.clone());
        Self {
            config,
            registry: ModelRegistry::empty(),
            upstream,
            registry_http: reqwest::Client::new(),
        }
    }
}
