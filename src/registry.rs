//! Model Registry — a process-wide, immutable snapshot of the upstream
//! model catalogue.
//!
//! Populated once at startup by [`ModelRegistry::fetch`]. Reads after that
//! go through [`ModelRegistry::snapshot`], which clones an `Arc` under a
//! read lock held only long enough to bump the refcount — the same
//! lock-then-clone-then-drop shape the reference codebase's `RouterState`
//! uses for its config snapshot.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use serde_json::Value;
use tokio::sync::RwLock;

const TIERS: [&str; 3] = ["haiku", "sonnet", "opus"];

/// An immutable view of the model catalogue plus its derived indexes.
#[derive(Debug, Clone)]
pub struct Snapshot {
    raw: Value,
    ids: HashSet<String>,
    supported_params: HashMap<String, HashSet<String>>,
    aliases: HashMap<String, String>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            raw: serde_json::json!({ "object": "list", "data": [] }),
            ids: HashSet::new(),
            supported_params: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    fn build(raw: Value) -> Self {
        let entries = raw
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut ids = HashSet::with_capacity(entries.len());
        let mut supported_params = HashMap::with_capacity(entries.len());
        let mut tier_candidates: HashMap<&str, Vec<(u64, String)>> =
            TIERS.iter().map(|t| (*t, Vec::new())).collect();

        for entry in &entries {
            let Some(id) = entry.get("id").and_then(Value::as_str) else {
                continue;
            };
            ids.insert(id.to_string());

            let params: HashSet<String> = entry
                .get("supported_parameters")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            supported_params.insert(id.to_string(), params);

            if let Some(tier) = claude_tier(id) {
                let created = entry.get("created").and_then(Value::as_u64).unwrap_or(0);
                tier_candidates.get_mut(tier).unwrap().push((created, id.to_string()));
            }
        }

        let aliases = tier_candidates
            .into_iter()
            .filter_map(|(tier, candidates)| {
                candidates.into_iter().max().map(|(_, id)| (tier.to_string(), id))
            })
            .collect();

        Self { raw, ids, supported_params, aliases }
    }

    /// The raw catalogue JSON, forwarded verbatim by `GET /v1/models`.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    /// `None` if `id` is not in the catalogue at all; `Some(&empty set)` if
    /// the model is known but advertises no parameters.
    pub fn supported_params(&self, id: &str) -> Option<&HashSet<String>> {
        self.supported_params.get(id)
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }
}

/// Classify a model id by the first of `haiku`/`sonnet`/`opus` it contains,
/// restricted to the `anthropic/claude*` namespace and excluding
/// free/beta/extended variants.
fn claude_tier(id: &str) -> Option<&'static str> {
    if !id.starts_with("anthropic/claude") {
        return None;
    }
    if id.contains(":free") || id.contains(":beta") || id.contains(":extended") {
        return None;
    }
    let lower = id.to_lowercase();
    TIERS.into_iter().find(|tier| lower.contains(tier))
}

/// Process-wide handle to the current [`Snapshot`].
///
/// Wraps the snapshot in `Arc<RwLock<Arc<Snapshot>>>` so steady-state reads
/// only ever take a brief read lock to clone the pointer; a re-fetch
/// replaces the inner `Arc` atomically under a write lock. `fetched` tracks
/// whether a fetch has ever succeeded, independent of whether the resulting
/// catalogue happened to be empty — `ids().is_empty()` alone can't tell
/// "never populated" apart from "populated with zero models".
pub struct ModelRegistry {
    inner: RwLock<std::sync::Arc<Snapshot>>,
    fetched: std::sync::atomic::AtomicBool,
}

impl ModelRegistry {
    /// An empty registry — `ids` empty, every `supported_params` lookup
    /// `None`, `aliases` empty. The state before the first fetch resolves.
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(std::sync::Arc::new(Snapshot::empty())),
            fetched: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> std::sync::Arc<Snapshot> {
        self.inner.read().await.clone()
    }

    /// Whether a fetch has ever completed successfully.
    pub fn has_fetched(&self) -> bool {
        self.fetched.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Fetch `GET {base_url}/models` and publish the resulting snapshot.
    pub async fn fetch(&self, client: &reqwest::Client, base_url: &str) -> anyhow::Result<()> {
        let url = format!("{base_url}/models");
        let response = client.get(&url).send().await.with_context(|| format!("GET {url}"))?;

        let status = response.status();
        let body = response.text().await.context("reading model list body")?;
        anyhow::ensure!(status.is_success(), "model list fetch returned HTTP {status}: {body}");

        let raw: Value =
            serde_json::from_str(&body).with_context(|| format!("parsing model list: {body}"))?;

        let snapshot = std::sync::Arc::new(Snapshot::build(raw));
        *self.inner.write().await = snapshot;
        self.fetched.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}
