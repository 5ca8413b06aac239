//! Model resolver — maps an Anthropic model name to an upstream model id.

use std::collections::HashMap;

const TIERS: [&str; 3] = ["haiku", "sonnet", "opus"];

/// Resolve `anthropic_model` to an upstream id.
///
/// 1. A global `override_model`, if set, always wins.
/// 2. A name already containing `/` is treated as upstream-qualified.
/// 3. Otherwise the lowercased name is scanned for `haiku`/`sonnet`/`opus`
///    (in that order) and mapped through `aliases` if a match is found.
/// 4. Anything else passes through unchanged.
pub fn resolve_model(
    anthropic_model: &str,
    override_model: Option<&str>,
    aliases: &HashMap<String, String>,
) -> String {
    if let Some(o) = override_model {
        if !o.is_empty() {
            return o.to_string();
        }
    }

    if anthropic_model.contains('/') {
        return anthropic_model.to_string();
    }

    let lower = anthropic_model.to_lowercase();
    for tier in TIERS {
        if lower.contains(tier) {
            if let Some(id) = aliases.get(tier) {
                return id.clone();
            }
        }
    }

    anthropic_model.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> HashMap<String, String> {
        [
            ("sonnet".to_string(), "anthropic/claude-sonnet-4.5".to_string()),
            ("opus".to_string(), "anthropic/claude-opus-4.1".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn override_always_wins() {
        let resolved = resolve_model("claude-3-5-sonnet", Some("forced/model"), &aliases());
        assert_eq!(resolved, "forced/model");
    }

    #[test]
    fn already_qualified_passes_through() {
        let resolved = resolve_model("openai/gpt-4o", None, &aliases());
        assert_eq!(resolved, "openai/gpt-4o");
    }

    #[test]
    fn maps_sonnet_tier() {
        let resolved = resolve_model("claude-3-5-sonnet", None, &aliases());
        assert_eq!(resolved, "anthropic/claude-sonnet-4.5");
    }

    #[test]
    fn maps_opus_tier_case_insensitively() {
        let resolved = resolve_model("Claude-OPUS-latest", None, &aliases());
        assert_eq!(resolved, "anthropic/claude-opus-4.1");
    }

    #[test]
    fn missing_tier_falls_through_to_passthrough() {
        // No haiku alias registered — shorthand requests for it pass through.
        let resolved = resolve_model("claude-3-haiku", None, &aliases());
        assert_eq!(resolved, "claude-3-haiku");
    }

    #[test]
    fn unknown_model_passes_through() {
        let resolved = resolve_model("some-custom-model", None, &aliases());
        assert_eq!(resolved, "some-custom-model");
    }

    #[test]
    fn resolver_is_idempotent() {
        let once = resolve_model("claude-3-5-sonnet", None, &aliases());
        let twice = resolve_model(&once, None, &aliases());
        assert_eq!(once, twice);
    }
}
