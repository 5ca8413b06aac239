//! Streaming translator — the state machine described in SPEC §4.6.
//!
//! [`Translator`] is a pure, synchronous struct: feed it one upstream SSE
//! line at a time, get back zero or more translated Anthropic SSE frames.
//! The async plumbing that turns an upstream `bytes_stream()` into lines and
//! forwards translated frames to the client lives in [`translate_stream`],
//! which spawns its own task and hands the caller a `ReceiverStream` —
//! the same channel-plus-task shape `yarenty-modelmux`'s streaming handlers
//! use for their own SSE responses.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::backends::SseStream;
use crate::proto::openai::StreamChunk;

const CHANNEL_BUFFER: usize = 64;

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis()
}

/// What kind of content block, if any, is currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    None,
    Text,
    Thinking,
    ToolUse(String),
}

/// One translated Anthropic SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: &'static str,
    data: Value,
}

impl Event {
    fn new(name: &'static str, data: Value) -> Self {
        Self { name, data }
    }

    pub fn to_bytes(&self) -> Bytes {
        let data = serde_json::to_string(&self.data).expect("event payload always serializes");
        Bytes::from(format!("event: {}\ndata: {data}\n\n", self.name))
    }
}

/// The §4.6 block state machine. Fed one upstream line at a time via
/// [`Translator::handle_line`]; [`Translator::finish`] produces the
/// epilogue once the upstream stream ends.
pub struct Translator {
    index: u64,
    mode: Mode,
    tool_buffers: HashMap<String, String>,
    usage: Option<crate::proto::openai::CompletionUsage>,
}

impl Translator {
    pub fn new() -> Self {
        Self { index: 0, mode: Mode::None, tool_buffers: HashMap::new(), usage: None }
    }

    /// The always-first event.
    pub fn message_start(model: &str, estimated_input_tokens: u64) -> Event {
        Event::new(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": format!("msg_{}", epoch_millis()),
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": model,
                    "stop_reason": Value::Null,
                    "stop_sequence": Value::Null,
                    "usage": { "input_tokens": estimated_input_tokens, "output_tokens": 1 },
                }
            }),
        )
    }

    fn stop_current(&self, events: &mut Vec<Event>) {
        events.push(Event::new(
            "content_block_stop",
            json!({ "type": "content_block_stop", "index": self.index }),
        ));
    }

    /// Parse one raw line from the upstream SSE body and react to it.
    /// Returns zero or more translated events.
    pub fn handle_line(&mut self, line: &str) -> Vec<Event> {
        let mut events = Vec::new();

        let Some(payload) = line.strip_prefix("data: ") else { return events };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return events;
        }

        let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) else { return events };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else { return events };
        let delta = choice.delta;

        if let Some(tool_calls) = delta.tool_calls.filter(|t| !t.is_empty()) {
            self.handle_tool_calls(tool_calls, &mut events);
        } else if let Some(reasoning) = delta.reasoning.filter(|r| !r.is_empty()) {
            self.handle_reasoning(reasoning, &mut events);
        } else if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            self.handle_content(content, &mut events);
        }

        events
    }

    fn handle_tool_calls(
        &mut self,
        deltas: Vec<crate::proto::openai::ToolCallDelta>,
        events: &mut Vec<Event>,
    ) {
        for delta in deltas {
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                let is_new = !matches!(&self.mode, Mode::ToolUse(current) if current == &id);
                if is_new {
                    if self.mode != Mode::None {
                        self.stop_current(events);
                    }
                    self.index += 1;
                    self.mode = Mode::ToolUse(id.clone());
                    self.tool_buffers.insert(id.clone(), String::new());
                    let name = delta.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default();
                    events.push(Event::new(
                        "content_block_start",
                        json!({
                            "type": "content_block_start",
                            "index": self.index,
                            "content_block": { "type": "tool_use", "id": id, "name": name, "input": {} },
                        }),
                    ));
                }
            }

            if let Mode::ToolUse(current_id) = self.mode.clone() {
                if let Some(fragment) = delta.function.as_ref().and_then(|f| f.arguments.clone()) {
                    self.tool_buffers.entry(current_id).or_default().push_str(&fragment);
                    events.push(Event::new(
                        "content_block_delta",
                        json!({
                            "type": "content_block_delta",
                            "index": self.index,
                            "delta": { "type": "input_json_delta", "partial_json": fragment },
                        }),
                    ));
                }
            }
        }
    }

    fn handle_reasoning(&mut self, text: String, events: &mut Vec<Event>) {
        if matches!(self.mode, Mode::Text | Mode::ToolUse(_)) {
            self.stop_current(events);
            self.index += 1;
            self.mode = Mode::None;
        }
        if self.mode != Mode::Thinking {
            events.push(Event::new(
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": self.index,
                    "content_block": { "type": "thinking", "thinking": "", "signature": "openrouter-reasoning" },
                }),
            ));
            self.mode = Mode::Thinking;
        }
        events.push(Event::new(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": self.index,
                "delta": { "type": "thinking_delta", "thinking": text },
            }),
        ));
    }

    fn handle_content(&mut self, text: String, events: &mut Vec<Event>) {
        if matches!(self.mode, Mode::Thinking | Mode::ToolUse(_)) {
            self.stop_current(events);
            self.index += 1;
            self.mode = Mode::None;
        }
        if self.mode != Mode::Text {
            events.push(Event::new(
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": self.index,
                    "content_block": { "type": "text", "text": "" },
                }),
            ));
            self.mode = Mode::Text;
        }
        events.push(Event::new(
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": self.index,
                "delta": { "type": "text_delta", "text": text },
            }),
        ));
    }

    /// The closing sequence once the upstream stream ends: close any open
    /// block, emit `message_delta`, emit `message_stop`.
    pub fn finish(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        if self.mode != Mode::None {
            self.stop_current(&mut events);
        }

        let stop_reason = if matches!(self.mode, Mode::ToolUse(_)) { "tool_use" } else { "end_turn" };
        let output_tokens = self.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0);

        events.push(Event::new(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": { "stop_reason": stop_reason, "stop_sequence": Value::Null },
                "usage": { "output_tokens": output_tokens },
            }),
        ));
        events.push(Event::new("message_stop", json!({ "type": "message_stop" })));
        events
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

/// A single `data: {"error": "..."}\n\n` frame, used when the upstream
/// response itself failed before any Anthropic events were emitted.
pub fn error_frame(body: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", json!({ "error": body })))
}

/// Drive the full streaming translation and hand back a `Stream` of
/// already-formatted Anthropic SSE byte frames.
///
/// Spawns its own task so the caller gets a stream back immediately instead
/// of blocking on upstream bytes; if the downstream receiver is dropped
/// (client disconnect), the next `send` fails and the task returns,
/// dropping `upstream` and closing its HTTP body promptly.
pub fn translate_stream(
    mut upstream: SseStream,
    model: String,
    estimated_input_tokens: u64,
) -> ReceiverStream<Bytes> {
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);

    tokio::spawn(async move {
        if tx.send(Translator::message_start(&model, estimated_input_tokens).to_bytes()).await.is_err() {
            return;
        }

        let mut translator = Translator::new();
        let mut buffer = String::new();

        while let Some(chunk) = upstream.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(_) => break,
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                for event in translator.handle_line(&line) {
                    if tx.send(event.to_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        }

        for event in translator.finish() {
            if tx.send(event.to_bytes()).await.is_err() {
                return;
            }
        }
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.name).collect()
    }

    #[test]
    fn seed_scenario_3_streaming_text() {
        let mut t = Translator::new();
        let mut all = Vec::new();
        all.extend(t.handle_line(r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#));
        all.extend(t.handle_line(r#"data: {"choices":[{"delta":{"content":" world"}}]}"#));
        all.extend(t.handle_line(r#"data: {"usage":{"completion_tokens":2}}"#));
        all.extend(t.handle_line("data: [DONE]"));
        all.extend(t.finish());

        assert_eq!(
            names(&all),
            vec![
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(all[0].data["content_block"]["type"], "text");
        assert_eq!(all[0].data["index"], 0);
        assert_eq!(all[1].data["delta"]["text"], "Hello");
        assert_eq!(all[2].data["delta"]["text"], " world");
        assert_eq!(all[4].data["delta"]["stop_reason"], "end_turn");
        assert_eq!(all[4].data["usage"]["output_tokens"], 2);
    }

    #[test]
    fn seed_scenario_4_streaming_mode_transition() {
        let mut t = Translator::new();
        let mut all = Vec::new();
        all.extend(t.handle_line(r#"data: {"choices":[{"delta":{"reasoning":"thinking..."}}]}"#));
        all.extend(t.handle_line(r#"data: {"choices":[{"delta":{"content":"answer"}}]}"#));
        all.extend(t.handle_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"id":"t1","function":{"name":"f","arguments":"{}"}}]}}]}"#,
        ));
        all.extend(t.finish());

        let indices: Vec<u64> = all
            .iter()
            .filter_map(|e| e.data.get("index").and_then(Value::as_u64))
            .collect();
        assert_eq!(indices, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);

        assert_eq!(
            names(&all),
            vec![
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        let message_delta = all.iter().find(|e| e.name == "message_delta").unwrap();
        assert_eq!(message_delta.data["delta"]["stop_reason"], "tool_use");
    }

    #[test]
    fn blank_and_non_data_lines_are_ignored() {
        let mut t = Translator::new();
        assert!(t.handle_line("").is_empty());
        assert!(t.handle_line(": comment").is_empty());
        assert!(t.handle_line("event: ping").is_empty());
    }

    #[test]
    fn unparseable_json_is_silently_skipped() {
        let mut t = Translator::new();
        assert!(t.handle_line("data: {not valid json").is_empty());
    }

    #[test]
    fn empty_choices_and_empty_delta_are_ignored() {
        let mut t = Translator::new();
        assert!(t.handle_line(r#"data: {"choices":[]}"#).is_empty());
        assert!(t.handle_line(r#"data: {"choices":[{"delta":{}}]}"#).is_empty());
    }

    #[test]
    fn tool_call_fragment_without_id_before_any_block_opens_emits_nothing() {
        let mut t = Translator::new();
        let events = t.handle_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"{\"a\":"}}]}}]}"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn tool_call_continuation_without_id_appends_to_open_block() {
        let mut t = Translator::new();
        t.handle_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"id":"t1","function":{"name":"f","arguments":"{"}}]}}]}"#,
        );
        let events = t.handle_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"}"}}]}}]}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "content_block_delta");
        assert_eq!(events[0].data["delta"]["partial_json"], "}");
    }

    #[test]
    fn same_tool_id_does_not_reopen_block() {
        let mut t = Translator::new();
        t.handle_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"id":"t1","function":{"name":"f","arguments":""}}]}}]}"#,
        );
        let starts_before = t.index;
        let events = t.handle_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"id":"t1","function":{"arguments":"x"}}]}}]}"#,
        );
        assert_eq!(t.index, starts_before);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "content_block_delta");
    }

    #[test]
    fn finish_with_nothing_open_emits_no_block_stop() {
        let mut t = Translator::new();
        let events = t.finish();
        assert_eq!(names(&events), vec!["message_delta", "message_stop"]);
        assert_eq!(events[0].data["delta"]["stop_reason"], "end_turn");
    }

    #[test]
    fn usage_from_mid_stream_chunk_feeds_message_delta() {
        let mut t = Translator::new();
        t.handle_line(r#"data: {"usage":{"prompt_tokens":5,"completion_tokens":7}}"#);
        let events = t.finish();
        let message_delta = events.iter().find(|e| e.name == "message_delta").unwrap();
        assert_eq!(message_delta.data["usage"]["output_tokens"], 7);
    }
}
