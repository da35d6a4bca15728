// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Tool call accumulation
//
// Per-stream table of in-progress tool calls keyed by slot index.
// Deltas are merged in arrival order; the table is cleared as a whole
// at each finish boundary.

use super::types::ToolCallDelta;

/// In-progress fields of one tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallAccumulator {
    /// Last non-empty ID seen for this slot.
    pub id: Option<String>,
    /// Last non-empty type tag seen (normally "function").
    pub kind: Option<String>,
    /// Last index value explicitly supplied by a delta.
    pub index: Option<u32>,
    /// Last non-empty function name seen.
    pub name: Option<String>,
    /// Concatenated argument fragments, in arrival order.
    pub arguments: String,
}

impl ToolCallAccumulator {
    /// Merge one delta into the accumulated state.
    pub fn merge(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = non_empty(delta.id.as_deref()) {
            self.id = Some(id.to_owned());
        }
        if let Some(kind) = non_empty(delta.kind.as_deref()) {
            self.kind = Some(kind.to_owned());
        }
        if let Some(index) = delta.index {
            self.index = Some(index);
        }
        if let Some(function) = &delta.function {
            if let Some(name) = non_empty(function.name.as_deref()) {
                self.name = Some(name.to_owned());
            }
            if let Some(arguments) = function.arguments.as_deref() {
                self.arguments.push_str(arguments);
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Slot index -> accumulator, iterated in insertion order.
#[derive(Debug, Default)]
pub struct AccumulatorTable {
    slots: Vec<(u32, ToolCallAccumulator)>,
}

impl AccumulatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the accumulator for `slot`, creating an empty one on first use.
    pub fn get_or_create(&mut self, slot: u32) -> &mut ToolCallAccumulator {
        let pos = match self.slots.iter().position(|(s, _)| *s == slot) {
            Some(pos) => pos,
            None => {
                self.slots.push((slot, ToolCallAccumulator::default()));
                self.slots.len() - 1
            }
        };
        &mut self.slots[pos].1
    }

    pub fn get(&self, slot: u32) -> Option<&ToolCallAccumulator> {
        self.slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, acc)| acc)
    }

    /// Iterate `(slot, accumulator)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ToolCallAccumulator)> {
        self.slots.iter().map(|(slot, acc)| (*slot, acc))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
