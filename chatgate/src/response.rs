// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Non-streaming response hook
//
// Runs on every successful non-streaming chat completion body before it is
// returned to the client. The default leaves the body untouched.

/// Transforms a complete (non-streaming) response body.
pub trait ResponseInterceptor: Send + Sync {
    fn intercept_response(&self, response: serde_json::Value) -> serde_json::Value;
}

/// Identity transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResponse;

impl ResponseInterceptor for PassthroughResponse {
    fn intercept_response(&self, response: serde_json::Value) -> serde_json::Value {
        response
    }
}
