// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Stream interceptor
//
// Transforms one upstream chunk into one normalized chunk. Tool call
// deltas are absorbed into the accumulator table and only re-emitted,
// whole, on the chunk that carries the finish reason.

use super::accumulator::AccumulatorTable;
use super::args::parse_arguments;
use super::types::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, FunctionDelta, ToolCallDelta, ToolCallPolicy,
};
use crate::message::ParsedToolCall;
use std::sync::Arc;

/// Per-stream normalization state.
///
/// One instance per client request. The accumulator table lives and dies
/// with it, so nothing leaks between requests.
pub struct StreamInterceptor {
    table: AccumulatorTable,
    policy: Arc<dyn ToolCallPolicy>,
    evaluated: Vec<ParsedToolCall>,
}

impl StreamInterceptor {
    pub fn new(policy: Arc<dyn ToolCallPolicy>) -> Self {
        Self {
            table: AccumulatorTable::new(),
            policy,
            evaluated: Vec::new(),
        }
    }

    /// Normalize one chunk.
    ///
    /// Only choice 0 is read. A chunk without choices is returned unchanged.
    pub fn process_chunk(&mut self, raw: ChatCompletionChunk) -> ChatCompletionChunk {
        if raw.choices.is_empty() {
            return raw;
        }
        let choice = &raw.choices[0];

        let mut delta = ChunkDelta {
            content: choice.delta.content.clone(),
            role: choice.delta.role.clone(),
            tool_calls: None,
        };

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for tool_call in tool_calls {
                let slot = tool_call.index.unwrap_or(0);
                self.table.get_or_create(slot).merge(tool_call);
            }
        }

        if choice.is_terminal() {
            let entries = self.finalize();
            // Consulted even for an empty batch; nothing is attached then.
            let allowed = self.policy.is_tool_call_allowed(&self.evaluated);
            match (entries.is_empty(), allowed) {
                (true, _) => {}
                (false, true) => delta.tool_calls = Some(entries),
                (false, false) => tracing::info!(
                    verdict = "block",
                    tools = ?self.evaluated.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    "streaming tool calls withheld by policy"
                ),
            }
            self.table.clear();
        }

        ChatCompletionChunk {
            id: raw.id.clone(),
            created: raw.created,
            model: raw.model.clone(),
            object: raw.object.clone(),
            choices: vec![ChunkChoice {
                index: choice.index,
                delta,
                finish_reason: choice.finish_reason.clone(),
                logprobs: choice.logprobs.clone(),
            }],
            extra: serde_json::Map::new(),
        }
    }

    /// Build parsed calls and transport entries for every named slot.
    ///
    /// Replaces the evaluation list. Slots that never received a name are
    /// dropped without emission.
    fn finalize(&mut self) -> Vec<ToolCallDelta> {
        self.evaluated.clear();
        let mut entries = Vec::with_capacity(self.table.len());

        for (slot, acc) in self.table.iter() {
            let Some(name) = acc.name.as_deref() else {
                tracing::debug!(slot, "dropping tool call without a name");
                continue;
            };

            self.evaluated.push(ParsedToolCall::new(
                acc.id.as_deref(),
                name,
                parse_arguments(&acc.arguments),
            ));
            // Clients expect the raw argument text, not a re-encoding.
            entries.push(ToolCallDelta {
                index: acc.index,
                id: acc.id.clone(),
                kind: acc.kind.clone(),
                function: Some(FunctionDelta {
                    name: Some(name.to_owned()),
                    arguments: Some(acc.arguments.clone()),
                }),
            });
        }

        entries
    }

    /// Calls finalized at the most recent finish boundary.
    pub fn evaluated_calls(&self) -> &[ParsedToolCall] {
        &self.evaluated
    }

    /// Number of tool call slots still awaiting a finish reason.
    pub fn pending_slots(&self) -> usize {
        self.table.len()
    }

    /// Drop any in-progress tool calls without emitting them.
    ///
    /// Returns how many slots were discarded.
    pub fn discard_pending(&mut self) -> usize {
        let n = self.table.len();
        self.table.clear();
        n
    }
}
