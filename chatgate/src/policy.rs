// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Tool-call release policies
//
// The stream interceptor asks a `ToolCallPolicy` once per finish boundary.
// The default approves everything; the allowlist policy is built from the
// `tools.allowed` config section.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::message::ParsedToolCall;
use crate::stream::{AllowAllToolCalls, ToolCallPolicy};

/// Approves a batch only when every call names an allowed tool.
#[derive(Debug, Clone)]
pub struct ToolAllowlistPolicy {
    allowed: HashSet<String>,
}

impl ToolAllowlistPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.contains(name)
    }
}

impl ToolCallPolicy for ToolAllowlistPolicy {
    fn is_tool_call_allowed(&self, calls: &[ParsedToolCall]) -> bool {
        let mut allowed = true;
        for call in calls {
            if self.is_allowed(&call.name) {
                tracing::debug!(
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    verdict = "allow",
                    "tool call allowed"
                );
            } else {
                tracing::info!(
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    verdict = "block",
                    "tool call not in allowlist"
                );
                allowed = false;
            }
        }
        allowed
    }
}

/// Pick the release policy for the configured tools section.
pub fn policy_from_config(tools: &ToolsConfig) -> Arc<dyn ToolCallPolicy> {
    match &tools.allowed {
        Some(names) => Arc::new(ToolAllowlistPolicy::new(names.iter().cloned())),
        None => Arc::new(AllowAllToolCalls),
    }
}
