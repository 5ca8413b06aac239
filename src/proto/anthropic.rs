//! Anthropic Messages API types — the dialect this service accepts from
//! clients and emits back to them.
//!
//! Request-side types derive [`serde::Deserialize`] only; response-side
//! content blocks derive [`serde::Serialize`] only. The two are never the
//! same struct even where fields overlap, since a request part (`tool_use`
//! carrying an `id` the client picked) and a response block (`tool_use`
//! carrying an `id` the model picked) serve different directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `system`: absent, a bare string, or an ordered list of text entries.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum SystemPrompt {
    Single(String),
    Multiple(Vec<SystemEntry>),
}

#[derive(Deserialize, Debug, Clone)]
pub struct SystemEntry {
    #[serde(default)]
    pub text: String,
}

/// One turn in `messages`. `role` is left as a plain string — turns with a
/// role other than `user`/`assistant` are simply ignored by the request
/// translator rather than rejected, matching the source behavior.
#[derive(Deserialize, Debug, Clone)]
pub struct MessageIn {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A content part. `text` is kept as a raw [`Value`] rather than `String`
/// because the spec calls for JSON-encoding it when the caller sends
/// something other than a string.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        #[serde(default)]
        text: Value,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    /// Any other part kind (e.g. `image`) is accepted but ignored —
    /// the translator has nothing to do with it.
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ToolChoice {
    Simple(String),
    Tagged {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Deserialize, Debug, Clone)]
pub struct Thinking {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub budget_tokens: Option<u64>,
}

/// The request body of `POST /v1/messages`.
#[derive(Deserialize, Debug, Clone)]
pub struct MessagesRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<MessageIn>,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<u64>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub reasoning: Option<Value>,
    #[serde(default)]
    pub reasoning_effort: Option<Value>,
    #[serde(default)]
    pub thinking: Option<Thinking>,
}

/// Body of `POST /v1/messages/count_tokens` — only the fields the token
/// estimator reads; everything else on a `MessagesRequest` is irrelevant to
/// counting.
#[derive(Deserialize, Debug, Clone)]
pub struct CountTokensRequest {
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub messages: Vec<MessageIn>,
}

// ── Response side ──────────────────────────────────────────────────────────

/// One Anthropic output content block — a closed, tagged-union variant per
/// kind, never a loose `serde_json::Value`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String, signature: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Serialize, Debug, Clone)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The non-streaming response body of `POST /v1/messages`.
#[derive(Serialize, Debug, Clone)]
pub struct AnthropicMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: &'static str,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}
