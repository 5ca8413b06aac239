//! Process configuration — a single struct loaded once at startup from
//! environment variables (optionally populated from a local `.env` file for
//! local development) and shared read-only for the process lifetime.
//!
//! Unlike the reference codebase's TOML multi-tier config with its polling
//! hot-reload watcher, this service has exactly one upstream and no runtime
//! reconfiguration: [`Config::load`] is called once in `main` before any
//! listener is bound.

use std::collections::HashMap;

use anyhow::Context;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_BIND_PORT: u16 = 8787;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream OpenAI-compatible endpoint.
    pub upstream_base_url: String,

    /// Upstream API key. When set, overrides any per-request credential the
    /// client supplies (§6 auth priority chain).
    pub upstream_api_key: Option<String>,

    /// When set, every request's resolved model is forced to this value
    /// regardless of what the resolver would otherwise pick.
    pub model_override: Option<String>,

    /// Address the HTTP listener binds to.
    pub bind_host: String,

    /// Port the HTTP listener binds to.
    pub bind_port: u16,
}

impl Config {
    /// Load configuration from the process environment, optionally seeded by
    /// a `.env` file in the working directory (mirroring
    /// `original_source/src/config.py`'s `load_dotenv()`).
    pub fn load() -> anyhow::Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !matches!(err, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound)
            {
                tracing::warn!(error = %err, "failed to load .env file");
            }
        }
        Self::from_env(&std::env::vars().collect())
    }

    /// Pure constructor over an environment snapshot — kept separate from
    /// [`Config::load`] so tests can exercise it without mutating the real
    /// process environment.
    pub fn from_env(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        let upstream_base_url = vars
            .get("OPENROUTER_BASE_URL")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let upstream_api_key = vars.get("OPENROUTER_API_KEY").filter(|v| !v.is_empty()).cloned();
        let model_override = vars.get("MODEL_OVERRIDE").filter(|v| !v.is_empty()).cloned();

        let bind_host =
            vars.get("HOST").filter(|v| !v.is_empty()).cloned().unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let bind_port = match vars.get("PORT").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().with_context(|| format!("PORT `{raw}` is not a valid port number"))?,
            None => DEFAULT_BIND_PORT,
        };

        anyhow::ensure!(!upstream_base_url.is_empty(), "OPENROUTER_BASE_URL must not be empty");

        Ok(Self { upstream_base_url, upstream_api_key, model_override, bind_host, bind_port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = Config::from_env(&HashMap::new()).unwrap();
        assert_eq!(config.upstream_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.bind_host, DEFAULT_BIND_HOST);
        assert_eq!(config.bind_port, DEFAULT_BIND_PORT);
        assert!(config.upstream_api_key.is_none());
        assert!(config.model_override.is_none());
    }

    #[test]
    fn reads_all_fields_from_env() {
        let config = Config::from_env(&vars(&[
            ("OPENROUTER_BASE_URL", "https://example.test/api/v1"),
            ("OPENROUTER_API_KEY", "sk-test-123"),
            ("MODEL_OVERRIDE", "anthropic/claude-opus-4.1"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.upstream_base_url, "https://example.test/api/v1");
        assert_eq!(config.upstream_api_key.as_deref(), Some("sk-test-123"));
        assert_eq!(config.model_override.as_deref(), Some("anthropic/claude-opus-4.1"));
        assert_eq!(config.bind_host, "127.0.0.1");
        assert_eq!(config.bind_port, 9000);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = Config::from_env(&vars(&[("OPENROUTER_BASE_URL", ""), ("OPENROUTER_API_KEY", "")])).unwrap();
        assert_eq!(config.upstream_base_url, DEFAULT_BASE_URL);
        assert!(config.upstream_api_key.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::from_env(&vars(&[("PORT", "not-a-number")]));
        assert!(result.is_err());
    }
}
