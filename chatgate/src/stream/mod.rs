// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Streaming response normalization
//
// Responsibilities:
// - Parse OpenAI-style SSE chat completion chunk streams
// - Pass content and role fragments through immediately
// - Accumulate tool call deltas per slot until the finish reason arrives
// - Release finalized tool calls through a policy hook, with raw argument text
// - Per-request state only: one interceptor (and table) per stream
// - Non-SSE responses passed through as-is

mod accumulator;
mod args;
mod interceptor;
mod processor;
mod sse;
mod types;

pub use accumulator::{AccumulatorTable, ToolCallAccumulator};
pub use args::{parse_arguments, parse_or};
pub use interceptor::StreamInterceptor;
pub use processor::StreamProcessor;
pub use sse::{classify_line, detect_sse, encode_chunk, SseLine};
pub use types::{
    AllowAllToolCalls, ChatCompletionChunk, ChunkChoice, ChunkDelta, FunctionDelta,
    ToolCallDelta, ToolCallPolicy,
};
