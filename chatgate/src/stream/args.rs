// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Best-effort argument decoding.
//
// Tool call arguments arrive as concatenated text fragments. A truncated
// or slightly malformed emission must not abort an otherwise healthy
// stream, so decoding never fails: it falls back instead.

use serde::de::DeserializeOwned;

/// Decode `text` as JSON, returning `fallback` on empty input or any error.
pub fn parse_or<T: DeserializeOwned>(text: &str, fallback: T) -> T {
    if text.trim().is_empty() {
        return fallback;
    }
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, len = text.len(), "tool call arguments not valid JSON");
            fallback
        }
    }
}

/// Decode tool call arguments, falling back to an empty JSON object.
pub fn parse_arguments(text: &str) -> serde_json::Value {
    parse_or(text, serde_json::Value::Object(serde_json::Map::new()))
}
