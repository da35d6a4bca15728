// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// Owns the per-request task: pulls upstream bytes, splits them into SSE
// lines, runs every decoded chunk through a fresh StreamInterceptor, and
// emits normalized lines on a bounded channel in arrival order.

use super::interceptor::StreamInterceptor;
use super::sse::{classify_line, detect_sse, encode_chunk, SseLine};
use super::types::ToolCallPolicy;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Normalizes an upstream SSE byte stream.
///
/// Each call to [`StreamProcessor::process`] spawns one task with its own
/// interceptor, so the processor itself can be shared across requests.
pub struct StreamProcessor {
    policy: Arc<dyn ToolCallPolicy>,
    idle_timeout: Option<Duration>,
}

impl StreamProcessor {
    pub fn new(policy: Arc<dyn ToolCallPolicy>, idle_timeout: Option<Duration>) -> Self {
        Self {
            policy,
            idle_timeout,
        }
    }

    /// Process an input byte stream, producing an output byte stream.
    ///
    /// The cancellation token is checked before every upstream read; once
    /// cancelled the task stops reading and the output stream ends.
    /// Non-SSE bodies are passed through; the decision waits until enough
    /// leading bytes have arrived to tell.
    pub fn process(
        &self,
        mut input: impl Stream<Item = Bytes> + Unpin + Send + 'static,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Bytes> {
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        let mut state = ProcessingState::new(StreamInterceptor::new(self.policy.clone()));
        let idle_timeout = self.idle_timeout;

        let task = async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("stream cancelled; no longer reading upstream");
                        break;
                    }
                    next = next_chunk(&mut input, idle_timeout) => next,
                };

                let chunk = match next {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(
                            timeout = ?idle_timeout,
                            "upstream stream idle timeout"
                        );
                        break;
                    }
                };

                match state.sse {
                    Some(true) => state.line_buffer.extend_from_slice(&chunk),
                    Some(false) => {
                        if tx.send(chunk).await.is_err() {
                            return; // Client disconnected
                        }
                        continue;
                    }
                    None => {
                        state.line_buffer.extend_from_slice(&chunk);
                        match detect_sse(&state.line_buffer) {
                            Some(true) => state.sse = Some(true),
                            Some(false) => {
                                state.sse = Some(false);
                                let head = std::mem::take(&mut state.line_buffer);
                                if tx.send(Bytes::from(head)).await.is_err() {
                                    return;
                                }
                                continue;
                            }
                            None => continue,
                        }
                    }
                }

                if drain_lines(&mut state, &tx).await.is_err() {
                    return;
                }
            }

            // Too short to classify: hand back what arrived.
            if state.sse.is_none() {
                if !state.line_buffer.is_empty() {
                    let head = std::mem::take(&mut state.line_buffer);
                    let _ = tx.send(Bytes::from(head)).await;
                }
                return;
            }

            // Process any remaining partial line
            if !state.line_buffer.is_empty() {
                let line = std::mem::take(&mut state.line_buffer);
                let line = String::from_utf8_lossy(&line);
                if process_single_line(&line, &mut state, &tx).await.is_err() {
                    return;
                }
            }

            state.discard_pending();
        };

        tokio::spawn(task.instrument(tracing::Span::current()));

        ReceiverStream::new(rx)
    }
}

async fn next_chunk(
    input: &mut (impl Stream<Item = Bytes> + Unpin),
    idle_timeout: Option<Duration>,
) -> Result<Option<Bytes>, tokio::time::error::Elapsed> {
    match idle_timeout {
        Some(timeout) => tokio::time::timeout(timeout, input.next()).await,
        None => Ok(input.next().await),
    }
}

// ---------------------------------------------------------------------------
// Processing state
// ---------------------------------------------------------------------------

/// Mutable state carried through the SSE processing loop.
struct ProcessingState {
    /// Bytes after the last newline. Kept as bytes so multi-byte UTF-8
    /// sequences split across network chunks survive.
    line_buffer: Vec<u8>,
    /// Whether the body is SSE; `None` until the leading bytes decide it.
    sse: Option<bool>,
    interceptor: StreamInterceptor,
}

impl ProcessingState {
    fn new(interceptor: StreamInterceptor) -> Self {
        Self {
            line_buffer: Vec::new(),
            sse: None,
            interceptor,
        }
    }

    /// Upstream ended without a finish reason for some tool calls.
    fn discard_pending(&mut self) {
        let discarded = self.interceptor.discard_pending();
        if discarded > 0 {
            tracing::warn!(
                slots = discarded,
                "stream ended without finish reason; discarding buffered tool calls"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Line processing
// ---------------------------------------------------------------------------

/// Drain all complete lines from the buffer and process each one.
async fn drain_lines(state: &mut ProcessingState, tx: &mpsc::Sender<Bytes>) -> Result<(), ()> {
    while let Some(newline_pos) = state.line_buffer.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = state.line_buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw[..newline_pos]);
        process_single_line(line.trim_end_matches('\r'), state, tx).await?;
    }
    Ok(())
}

/// Process a single SSE line.
async fn process_single_line(
    line: &str,
    state: &mut ProcessingState,
    tx: &mpsc::Sender<Bytes>,
) -> Result<(), ()> {
    let out = match classify_line(line) {
        SseLine::Separator => "\n".to_string(),
        SseLine::Done => {
            state.discard_pending();
            format!("{line}\n")
        }
        SseLine::Other => format!("{line}\n"),
        SseLine::Chunk(chunk) => {
            let normalized = state.interceptor.process_chunk(*chunk);
            if normalized.choices.is_empty() {
                // Nothing to normalize; keep the upstream bytes exactly.
                format!("{line}\n")
            } else {
                match encode_chunk(&normalized) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode normalized chunk");
                        format!("{line}\n")
                    }
                }
            }
        }
    };

    tx.send(Bytes::from(out)).await.map_err(|_| ())
}
