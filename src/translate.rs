//! Request translation (Anthropic → OpenAI), the tool-pairing validator, the
//! non-streaming response translator (OpenAI → Anthropic), and the token
//! estimator.
//!
//! All four are pure functions over the wire types in [`crate::proto`] — no
//! I/O, nothing async. The streaming counterpart to the response translator
//! lives in [`crate::stream`], since it is stateful rather than pure.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::proto::anthropic::{
    AnthropicMessage, ContentBlock, ContentPart, MessageContent, MessageIn, SystemEntry,
    SystemPrompt, Thinking, Tool, ToolChoice, Usage,
};
use crate::proto::openai::{
    ChatCompletionRequest, CompletionResponse, FunctionCall, FunctionDef, Message,
    SystemContentPart, ToolCall, ToolDef,
};
use crate::resolve::resolve_model;

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis()
}

/// Render a `text` content-part's raw JSON value the way §4.3 wants it: the
/// string itself when it is one, otherwise its JSON encoding.
fn text_to_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn system_turns(system: &Option<SystemPrompt>, model_id: &str) -> Vec<Message> {
    let cache = model_id.contains("claude");
    let part_for = |text: String| SystemContentPart {
        kind: "text",
        text,
        cache_control: cache.then_some(crate::proto::openai::CacheControl { kind: "ephemeral" }),
    };

    match system {
        None => vec![],
        Some(SystemPrompt::Single(text)) => {
            vec![Message::System { content: vec![part_for(text.clone())] }]
        }
        Some(SystemPrompt::Multiple(entries)) => entries
            .iter()
            .map(|SystemEntry { text }| Message::System { content: vec![part_for(text.clone())] })
            .collect(),
    }
}

fn build_assistant_turn(parts: &[ContentPart]) -> Option<Message> {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => texts.push(text_to_string(text)),
            ContentPart::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            ContentPart::ToolResult { .. } | ContentPart::Other => {}
        }
    }

    let joined = texts.join("\n").trim().to_string();
    if joined.is_empty() && tool_calls.is_empty() {
        return None;
    }

    Some(Message::Assistant {
        content: if joined.is_empty() { None } else { Some(joined) },
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
    })
}

fn build_user_turns(parts: &[ContentPart]) -> Vec<Message> {
    let mut texts = Vec::new();
    let mut turns = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => texts.push(text_to_string(text)),
            ContentPart::ToolResult { tool_use_id, content } => {
                let content = match content.as_str() {
                    Some(s) => s.to_string(),
                    None => serde_json::to_string(content).unwrap_or_else(|_| "null".to_string()),
                };
                turns.push(Message::Tool { tool_call_id: tool_use_id.clone(), content });
            }
            ContentPart::ToolUse { .. } | ContentPart::Other => {}
        }
    }

    let joined = texts.join("\n").trim().to_string();
    let mut out = Vec::with_capacity(turns.len() + 1);
    if !joined.is_empty() {
        out.push(Message::User { content: joined });
    }
    out.extend(turns);
    out
}

fn build_message_turn(turn: &MessageIn) -> Vec<Message> {
    match (&turn.content, turn.role.as_str()) {
        (MessageContent::Text(text), "user") => vec![Message::User { content: text.clone() }],
        (MessageContent::Text(text), "assistant") => {
            vec![Message::Assistant { content: Some(text.clone()), tool_calls: None }]
        }
        (MessageContent::Parts(parts), "assistant") => build_assistant_turn(parts).into_iter().collect(),
        (MessageContent::Parts(parts), "user") => build_user_turns(parts),
        _ => vec![],
    }
}

/// Drop tool calls / tool results that don't pair up, per §4.4.
///
/// `messages` is the full non-system turn list already produced by
/// [`build_message_turn`]; tool turns scan backward against this original
/// list (not against the filtered output built so far) to find their
/// pairing assistant turn.
pub fn validate_tool_pairing(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());

    for (i, turn) in messages.iter().enumerate() {
        match turn {
            Message::Assistant { content, tool_calls } => {
                let kept_calls = tool_calls.as_ref().map(|calls| {
                    let following_ids: std::collections::HashSet<&str> = messages[i + 1..]
                        .iter()
                        .take_while(|m| matches!(m, Message::Tool { .. }))
                        .filter_map(Message::as_tool_call_id)
                        .collect();
                    calls
                        .iter()
                        .filter(|c| following_ids.contains(c.id.as_str()))
                        .cloned()
                        .collect::<Vec<_>>()
                });
                let kept_calls = kept_calls.filter(|c| !c.is_empty());
                if content.is_some() || kept_calls.is_some() {
                    out.push(Message::Assistant { content: content.clone(), tool_calls: kept_calls });
                }
            }
            Message::Tool { tool_call_id, content } => {
                let paired = messages[..i]
                    .iter()
                    .rev()
                    .find(|m| !matches!(m, Message::Tool { .. }))
                    .is_some_and(|m| {
                        m.as_assistant()
                            .and_then(|(_, calls)| calls.as_ref())
                            .is_some_and(|calls| calls.iter().any(|c| &c.id == tool_call_id))
                    });
                if paired {
                    out.push(Message::Tool { tool_call_id: tool_call_id.clone(), content: content.clone() });
                }
            }
            other => out.push(other.clone()),
        }
    }

    out
}

fn translate_reasoning(body: &crate::proto::anthropic::MessagesRequest) -> (Option<Value>, Option<Value>) {
    let reasoning = match &body.reasoning {
        Some(r) => Some(r.clone()),
        None => match &body.thinking {
            Some(Thinking { kind, budget_tokens }) if kind == "enabled" => {
                Some(json!({ "max_tokens": budget_tokens }))
            }
            _ => None,
        },
    };
    (reasoning, body.reasoning_effort.clone())
}

/// `None` for a tagged `tool_choice` whose `type` isn't one of the three
/// defined tags — matching `original_source`'s `anthropic_to_openai`, which
/// has no `else` branch and simply leaves `tool_choice` unset for an
/// unrecognized tag rather than passing the tag through as a value.
fn translate_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::Simple(s) => Some(json!(s)),
        ToolChoice::Tagged { kind, .. } if kind == "auto" => Some(json!("auto")),
        ToolChoice::Tagged { kind, .. } if kind == "any" => Some(json!("required")),
        ToolChoice::Tagged { kind, name } if kind == "tool" => {
            Some(json!({ "type": "function", "function": { "name": name.clone().unwrap_or_default() } }))
        }
        ToolChoice::Tagged { .. } => None,
    }
}

fn translate_tool(tool: &Tool) -> ToolDef {
    ToolDef {
        kind: "function",
        function: FunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            parameters: tool.input_schema.clone().unwrap_or_else(|| json!({})),
        },
    }
}

/// Translate an Anthropic `/v1/messages` request body into an OpenAI
/// chat-completions request, per §4.3.
pub fn translate_request(
    body: &crate::proto::anthropic::MessagesRequest,
    override_model: Option<&str>,
    aliases: &std::collections::HashMap<String, String>,
) -> ChatCompletionRequest {
    let model = resolve_model(&body.model, override_model, aliases);

    let mut messages = system_turns(&body.system, &model);
    let rest: Vec<Message> = body.messages.iter().flat_map(build_message_turn).collect();
    messages.extend(validate_tool_pairing(&rest));

    let (reasoning, reasoning_effort) = translate_reasoning(body);

    ChatCompletionRequest {
        model,
        messages,
        stream: body.stream,
        temperature: body.temperature,
        max_tokens: body.max_tokens,
        top_p: body.top_p,
        top_k: body.top_k,
        stop: body.stop_sequences.clone().filter(|s| !s.is_empty()),
        reasoning,
        reasoning_effort,
        tool_choice: body.tool_choice.as_ref().and_then(translate_tool_choice),
        tools: body
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(translate_tool).collect())
            .filter(|t: &Vec<ToolDef>| !t.is_empty()),
    }
}

/// Translate a non-streaming OpenAI completion response into an Anthropic
/// message, per §4.5.
pub fn openai_to_anthropic(response: &CompletionResponse, model: &str) -> AnthropicMessage {
    let choice = response.choices.first().cloned().unwrap_or_default();
    let message = choice.message;

    let mut content = Vec::new();
    if let Some(reasoning) = message.reasoning.filter(|r| !r.is_empty()) {
        content.push(ContentBlock::Thinking {
            thinking: reasoning,
            signature: "openrouter-reasoning".to_string(),
        });
    }
    if let Some(text) = message.content.filter(|c| !c.is_empty()) {
        content.push(ContentBlock::Text { text });
    }
    let tool_calls_present = message.tool_calls.as_ref().is_some_and(|t| !t.is_empty());
    for call in message.tool_calls.into_iter().flatten() {
        let input = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
        content.push(ContentBlock::ToolUse { id: call.id, name: call.function.name, input });
    }

    let stop_reason = if choice.finish_reason.as_deref() == Some("tool_calls") || tool_calls_present {
        "tool_use"
    } else {
        "end_turn"
    };

    let usage = response.usage.clone().unwrap_or_default();

    AnthropicMessage {
        id: format!("msg_{}", epoch_millis()),
        kind: "message",
        role: "assistant",
        content,
        model: model.to_string(),
        stop_reason,
        stop_sequence: None,
        usage: Usage { input_tokens: usage.prompt_tokens, output_tokens: usage.completion_tokens },
    }
}

/// Character-counting heuristic per §4.7: `⌈chars / 4⌉`.
pub fn estimate_tokens(system: &Option<SystemPrompt>, messages: &[MessageIn]) -> u64 {
    let mut chars = 0usize;

    match system {
        None => {}
        Some(SystemPrompt::Single(text)) => chars += text.chars().count(),
        Some(SystemPrompt::Multiple(entries)) => {
            chars += entries.iter().map(|e| e.text.chars().count()).sum::<usize>()
        }
    }

    for message in messages {
        match &message.content {
            MessageContent::Text(text) => chars += text.chars().count(),
            MessageContent::Parts(parts) => {
                for part in parts {
                    if let ContentPart::Text { text } = part {
                        chars += text_to_string(text).chars().count();
                    }
                }
            }
        }
    }

    chars.div_ceil(4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::anthropic::MessagesRequest;
    use std::collections::HashMap;

    fn aliases() -> HashMap<String, String> {
        [("sonnet".to_string(), "anthropic/claude-sonnet-4.5".to_string())].into_iter().collect()
    }

    fn request(json: Value) -> MessagesRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn seed_scenario_1_simple_map_and_translate() {
        let body = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Hello"}],
        }));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.model, "anthropic/claude-sonnet-4.5");
        assert_eq!(out.messages.len(), 1);
        match &out.messages[0] {
            Message::User { content } => assert_eq!(content, "Hello"),
            other => panic!("expected user turn, got {other:?}"),
        }
    }

    #[test]
    fn seed_scenario_2_tool_round_trip() {
        let body = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {
                    "role": "assistant",
                    "content": [
                        {"type": "tool_use", "id": "tool_123", "name": "get_weather", "input": {"location": "NYC"}}
                    ]
                },
                {
                    "role": "user",
                    "content": [
                        {"type": "tool_result", "tool_use_id": "tool_123", "content": "Sunny, 72F"}
                    ]
                }
            ],
        }));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.messages.len(), 2);

        match &out.messages[0] {
            Message::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                let calls = tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].id, "tool_123");
                assert_eq!(calls[0].function.arguments, r#"{"location":"NYC"}"#);
            }
            other => panic!("expected assistant turn, got {other:?}"),
        }
        match &out.messages[1] {
            Message::Tool { tool_call_id, content } => {
                assert_eq!(tool_call_id, "tool_123");
                assert_eq!(content, "Sunny, 72F");
            }
            other => panic!("expected tool turn, got {other:?}"),
        }
    }

    #[test]
    fn seed_scenario_5_orphan_tool_filtering() {
        let body = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {
                    "role": "assistant",
                    "content": [
                        {"type": "tool_use", "id": "tool_1", "name": "a", "input": {}},
                        {"type": "tool_use", "id": "tool_2", "name": "b", "input": {}}
                    ]
                },
                {
                    "role": "user",
                    "content": [{"type": "tool_result", "tool_use_id": "tool_1", "content": "ok"}]
                }
            ],
        }));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.messages.len(), 2);
        match &out.messages[0] {
            Message::Assistant { tool_calls, .. } => {
                let calls = tool_calls.as_ref().unwrap();
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "tool_1");
            }
            other => panic!("expected assistant turn, got {other:?}"),
        }
    }

    #[test]
    fn seed_scenario_6_token_estimate() {
        let body = request(json!({
            "model": "claude-3-5-sonnet",
            "system": "You are helpful.",
            "messages": [{"role": "user", "content": "Hi"}],
        }));
        assert_eq!(estimate_tokens(&body.system, &body.messages), 5);
    }

    #[test]
    fn system_string_gets_cache_control_for_claude_models() {
        let body = request(json!({
            "model": "claude-3-5-sonnet",
            "system": "be terse",
            "messages": [],
        }));
        let out = translate_request(&body, None, &aliases());
        match &out.messages[0] {
            Message::System { content } => {
                assert!(content[0].cache_control.is_some());
            }
            other => panic!("expected system turn, got {other:?}"),
        }
    }

    #[test]
    fn system_list_becomes_one_turn_per_entry() {
        let body = request(json!({
            "model": "gpt-4o",
            "system": [{"text": "first"}, {"text": "second"}],
            "messages": [],
        }));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.messages.len(), 2);
    }

    #[test]
    fn override_model_wins_over_resolver() {
        let body = request(json!({
            "model": "claude-3-5-sonnet",
            "messages": [],
        }));
        let out = translate_request(&body, Some("forced/model"), &aliases());
        assert_eq!(out.model, "forced/model");
    }

    #[test]
    fn non_string_text_part_is_json_encoded() {
        let body = request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": [{"type": "text", "text": {"nested": 1}}]}],
        }));
        let out = translate_request(&body, None, &aliases());
        match &out.messages[0] {
            Message::User { content } => assert_eq!(content, r#"{"nested":1}"#),
            other => panic!("expected user turn, got {other:?}"),
        }
    }

    #[test]
    fn tool_result_non_string_content_is_json_encoded() {
        let body = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "assistant", "content": [{"type": "tool_use", "id": "t1", "name": "f", "input": {}}]},
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "t1", "content": {"ok": true}}]}
            ],
        }));
        let out = translate_request(&body, None, &aliases());
        match &out.messages[1] {
            Message::Tool { content, .. } => assert_eq!(content, r#"{"ok":true}"#),
            other => panic!("expected tool turn, got {other:?}"),
        }
    }

    #[test]
    fn assistant_turn_with_only_tool_use_has_no_content_field() {
        let body = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "assistant", "content": [{"type": "tool_use", "id": "t1", "name": "f", "input": {}}]}
            ],
        }));
        let out = translate_request(&body, None, &aliases());
        match &out.messages[0] {
            Message::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert!(tool_calls.is_some());
            }
            other => panic!("expected assistant turn, got {other:?}"),
        }
    }

    #[test]
    fn thinking_enabled_becomes_reasoning_max_tokens() {
        let body = request(json!({
            "model": "gpt-4o",
            "messages": [],
            "thinking": {"type": "enabled", "budget_tokens": 2048},
        }));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.reasoning, Some(json!({"max_tokens": 2048})));
    }

    #[test]
    fn reasoning_field_wins_over_thinking() {
        let body = request(json!({
            "model": "gpt-4o",
            "messages": [],
            "reasoning": {"effort": "high"},
            "thinking": {"type": "enabled", "budget_tokens": 2048},
        }));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.reasoning, Some(json!({"effort": "high"})));
    }

    #[test]
    fn tool_choice_variants_translate() {
        let aliases = aliases();
        let auto = request(json!({"model": "m", "messages": [], "tool_choice": {"type": "auto"}}));
        assert_eq!(translate_request(&auto, None, &aliases).tool_choice, Some(json!("auto")));

        let any = request(json!({"model": "m", "messages": [], "tool_choice": {"type": "any"}}));
        assert_eq!(translate_request(&any, None, &aliases).tool_choice, Some(json!("required")));

        let tool = request(json!({"model": "m", "messages": [], "tool_choice": {"type": "tool", "name": "get_weather"}}));
        assert_eq!(
            translate_request(&tool, None, &aliases).tool_choice,
            Some(json!({"type": "function", "function": {"name": "get_weather"}}))
        );
    }

    #[test]
    fn unrecognized_tool_choice_tag_is_dropped_not_passed_through() {
        let aliases = aliases();
        let unknown = request(json!({"model": "m", "messages": [], "tool_choice": {"type": "future-mode"}}));
        assert_eq!(translate_request(&unknown, None, &aliases).tool_choice, None);
    }

    #[test]
    fn stop_sequences_map_to_stop_only_when_non_empty() {
        let body = request(json!({"model": "m", "messages": [], "stop_sequences": []}));
        assert_eq!(translate_request(&body, None, &aliases()).stop, None);

        let body = request(json!({"model": "m", "messages": [], "stop_sequences": ["END"]}));
        assert_eq!(translate_request(&body, None, &aliases()).stop, Some(vec!["END".to_string()]));
    }

    #[test]
    fn response_translator_non_streaming_text_only() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "hi there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3},
        }))
        .unwrap();
        let out = openai_to_anthropic(&response, "anthropic/claude-sonnet-4.5");
        assert_eq!(out.content, vec![ContentBlock::Text { text: "hi there".to_string() }]);
        assert_eq!(out.stop_reason, "end_turn");
        assert_eq!(out.usage.input_tokens, 10);
        assert_eq!(out.usage.output_tokens, 3);
    }

    #[test]
    fn response_translator_tool_calls_set_stop_reason() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "tool_calls": [{"id": "t1", "type": "function", "function": {"name": "f", "arguments": "{\"a\":1}"}}]
                },
                "finish_reason": "tool_calls",
            }],
        }))
        .unwrap();
        let out = openai_to_anthropic(&response, "m");
        assert_eq!(out.stop_reason, "tool_use");
        assert_eq!(
            out.content,
            vec![ContentBlock::ToolUse { id: "t1".to_string(), name: "f".to_string(), input: json!({"a": 1}) }]
        );
    }

    #[test]
    fn response_translator_malformed_tool_arguments_default_to_empty_object() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "tool_calls": [{"id": "t1", "type": "function", "function": {"name": "f", "arguments": "not json"}}]
                }
            }],
        }))
        .unwrap();
        let out = openai_to_anthropic(&response, "m");
        assert_eq!(out.content, vec![ContentBlock::ToolUse { id: "t1".to_string(), name: "f".to_string(), input: json!({}) }]);
    }

    #[test]
    fn response_translator_reasoning_becomes_thinking_block_first() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "answer", "reasoning": "because"}}],
        }))
        .unwrap();
        let out = openai_to_anthropic(&response, "m");
        assert_eq!(
            out.content,
            vec![
                ContentBlock::Thinking { thinking: "because".to_string(), signature: "openrouter-reasoning".to_string() },
                ContentBlock::Text { text: "answer".to_string() },
            ]
        );
    }

    #[test]
    fn missing_tier_alias_falls_through_to_passthrough() {
        let body = request(json!({"model": "claude-3-haiku", "messages": []}));
        let out = translate_request(&body, None, &aliases());
        assert_eq!(out.model, "claude-3-haiku");
    }

    #[test]
    fn empty_messages_system_and_tools_are_legal() {
        let body = request(json!({"model": "m", "messages": []}));
        let out = translate_request(&body, None, &HashMap::new());
        assert!(out.messages.is_empty());
        assert!(out.tools.is_none());
    }
}
