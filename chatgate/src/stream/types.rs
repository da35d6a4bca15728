// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Wire types for OpenAI-compatible chat completion chunks, plus the
// policy seam consulted before finalized tool calls are released.

use crate::message::ParsedToolCall;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk envelope
// ---------------------------------------------------------------------------

/// One `chat.completion.chunk` event.
///
/// Used for both directions: upstream chunks are deserialized into it and
/// normalized chunks are serialized from it. Fields this layer does not
/// interpret (`usage`, `system_fingerprint`, ...) land in `extra` and are
/// only preserved when a chunk is passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_object")]
    pub object: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_object() -> String {
    "chat.completion.chunk".to_string()
}

/// A single choice within a chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Serialized as `null` when absent, matching the upstream chunk shape.
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Opaque log-probability payload, forwarded unmodified. An explicit
    /// `null` is kept as `Some(Value::Null)`; only an absent field is `None`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub logprobs: Option<serde_json::Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl ChunkChoice {
    /// A finish reason only ends the stream when it is non-empty.
    pub fn is_terminal(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_some_and(|reason| !reason.is_empty())
    }
}

/// The incremental field-set carried by one chunk.
///
/// Absent fields are omitted from the serialized form, never `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A partial fragment of one tool call, addressed by slot index.
///
/// Also the transport shape of a finalized entry on the terminal chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Decides whether the tool calls finalized at a finish boundary may be
/// released to the client.
///
/// Invoked once per boundary with every finalized call. Rejection withholds
/// the whole batch; the stream itself continues.
pub trait ToolCallPolicy: Send + Sync {
    fn is_tool_call_allowed(&self, calls: &[ParsedToolCall]) -> bool;
}

/// Default policy: approve everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllToolCalls;

impl ToolCallPolicy for AllowAllToolCalls {
    fn is_tool_call_allowed(&self, _calls: &[ParsedToolCall]) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_openai_tool_call_chunk() {
        let raw = r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1700000000,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"read_file","arguments":""}}]},"finish_reason":null}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();

        assert_eq!(chunk.id, "chatcmpl-1");
        assert_eq!(chunk.created, 1_700_000_000);
        let tc = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.index, Some(0));
        assert_eq!(tc.kind.as_deref(), Some("function"));
        assert_eq!(
            tc.function.as_ref().unwrap().name.as_deref(),
            Some("read_file")
        );
    }

    #[test]
    fn unknown_fields_are_kept_in_extra() {
        let raw = r#"{"id":"c","object":"chat.completion.chunk","created":1,"model":"m","choices":[],"usage":{"total_tokens":7},"system_fingerprint":"fp"}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();

        assert_eq!(chunk.extra["usage"], json!({"total_tokens": 7}));
        assert_eq!(chunk.extra["system_fingerprint"], "fp");
    }

    #[test]
    fn unknown_delta_fields_are_ignored() {
        let raw = r#"{"id":"c","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"hi","refusal":null,"reasoning":"x"}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn absent_delta_fields_are_omitted_on_serialize() {
        let delta = ChunkDelta {
            content: Some("Hello".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&delta).unwrap();
        assert_eq!(value, json!({"content": "Hello"}));
    }

    #[test]
    fn finish_reason_serializes_as_null_when_absent() {
        let choice = ChunkChoice::default();
        let value = serde_json::to_value(&choice).unwrap();
        assert_eq!(value["finish_reason"], serde_json::Value::Null);
        assert!(value.get("logprobs").is_none());
    }

    #[test]
    fn null_logprobs_survive_a_round_trip() {
        let choice: ChunkChoice =
            serde_json::from_value(json!({"index": 0, "delta": {}, "logprobs": null})).unwrap();
        assert_eq!(choice.logprobs, Some(serde_json::Value::Null));

        let value = serde_json::to_value(&choice).unwrap();
        assert_eq!(value["logprobs"], serde_json::Value::Null);
        assert!(value.as_object().unwrap().contains_key("logprobs"));
    }

    #[test]
    fn empty_finish_reason_is_not_terminal() {
        let mut choice = ChunkChoice::default();
        assert!(!choice.is_terminal());
        choice.finish_reason = Some(String::new());
        assert!(!choice.is_terminal());
        choice.finish_reason = Some("stop".into());
        assert!(choice.is_terminal());
    }

    #[test]
    fn allow_all_approves_any_batch() {
        let calls = vec![ParsedToolCall::new(Some("c1"), "rm_rf", json!({}))];
        assert!(AllowAllToolCalls.is_tool_call_allowed(&calls));
        assert!(AllowAllToolCalls.is_tool_call_allowed(&[]));
    }
}
