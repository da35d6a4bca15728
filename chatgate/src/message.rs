// Finalized tool call representation
//
// The canonical type that policy hooks operate on. The stream
// interceptor produces `Vec<ParsedToolCall>` at each finish boundary;
// policies consume it before anything reaches the client.

use serde::Serialize;
use uuid::Uuid;

/// A tool call reconstructed from a stream of deltas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedToolCall {
    /// Upstream-supplied ID, or a synthesized `call_<uuid>` when none arrived.
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments (not a raw string). Empty object when the
    /// accumulated text was empty or malformed.
    pub arguments: serde_json::Value,
}

impl ParsedToolCall {
    pub fn new(
        id: Option<&str>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(synthesize_call_id),
            name: name.into(),
            arguments,
        }
    }
}

/// Generate a tool call ID for providers that stream calls without one.
pub fn synthesize_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}
