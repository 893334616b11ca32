//! Delta decoding
//!
//! Normalizes one pipeline chunk into typed events. Message objects and
//! tool calls arrive in more than one shape; decoding folds them into one
//! canonical form and falls back to stringification instead of failing.

use crate::events::MessageKind;
use agent_core::{PipelineChunk, keys, stringify};
use serde::Deserialize;
use serde_json::{Value, json};

/// A normalized tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

/// A typed event decoded from a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Message { kind: MessageKind, text: String },
    ToolCall(ToolCall),
    FieldUpdate { name: &'static str, value: Value },
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    #[serde(default = "unknown_name")]
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// The two tool-call shapes pipelines emit
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawToolCall {
    /// `{"function": {"name": ..., "arguments": "<json>"}}`
    Structured { function: RawFunction },
    /// `{"name": ..., "args": {...}}`
    Plain {
        #[serde(default = "unknown_name")]
        name: String,
        #[serde(default = "empty_args")]
        args: Value,
    },
}

fn unknown_name() -> String {
    "unknown".to_string()
}

fn empty_args() -> Value {
    json!({})
}

impl From<RawToolCall> for ToolCall {
    fn from(raw: RawToolCall) -> Self {
        match raw {
            RawToolCall::Structured { function } => {
                let args = match function.arguments {
                    // encoded arguments are decoded when they parse
                    Value::String(encoded) => {
                        serde_json::from_str(&encoded).unwrap_or(Value::String(encoded))
                    }
                    Value::Null => empty_args(),
                    other => other,
                };
                ToolCall {
                    name: function.name,
                    args,
                }
            }
            RawToolCall::Plain { name, args } => ToolCall { name, args },
        }
    }
}

/// Decode one tool call, whatever its shape
pub fn decode_tool_call(value: &Value) -> ToolCall {
    match RawToolCall::deserialize(value) {
        Ok(raw) => raw.into(),
        Err(_) => ToolCall {
            name: stringify(value),
            args: empty_args(),
        },
    }
}

/// Flatten message content to text.
///
/// Plain text passes through. A list of parts renders `text` parts as their
/// text and `tool_use` parts as `[Tool: <name>]`, joined by single spaces;
/// non-mapping parts are stringified. Anything else is stringified.
pub fn extract_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => {
            let mut pieces: Vec<String> = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                        Some("text") => pieces.push(
                            map.get("text").map(stringify).unwrap_or_default(),
                        ),
                        Some("tool_use") => {
                            let name = map.get("name").and_then(Value::as_str).unwrap_or("unknown");
                            pieces.push(format!("[Tool: {name}]"));
                        }
                        _ => {}
                    },
                    other => pieces.push(stringify(other)),
                }
            }
            pieces.join(" ")
        }
        other => stringify(other),
    }
}

/// Decode the last message of a message list.
///
/// A message without `content` is stringified as a system message; tool
/// calls are decoded for any object message either way.
pub fn decode_message(message: &Value) -> Vec<Delta> {
    let map = message.as_object();

    let first = match map.and_then(|m| m.get("content")) {
        Some(content) => Delta::Message {
            kind: MessageKind::Reasoning,
            text: extract_content(content),
        },
        None => Delta::Message {
            kind: MessageKind::System,
            text: stringify(message),
        },
    };
    let mut deltas = vec![first];

    if let Some(calls) = map
        .and_then(|m| m.get(keys::TOOL_CALLS))
        .and_then(Value::as_array)
    {
        deltas.extend(calls.iter().map(|call| Delta::ToolCall(decode_tool_call(call))));
    }
    deltas
}

/// Decode a whole chunk: the last message (with its tool calls) first,
/// then one field update per non-empty monitored field.
pub fn decode(chunk: &PipelineChunk) -> Vec<Delta> {
    let mut deltas = chunk.messages().last().map(decode_message).unwrap_or_default();

    for name in keys::MONITORED_FIELDS {
        if let Some(value) = chunk.non_empty(name) {
            deltas.push(Delta::FieldUpdate {
                name,
                value: value.clone(),
            });
        }
    }
    deltas
}
