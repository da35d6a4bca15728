// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// SSE line handling
//
// Classify individual lines of an OpenAI-style event stream and frame
// normalized chunks back into `data:` lines.

use super::types::ChatCompletionChunk;

/// What a single SSE line carries.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Blank line: event separator.
    Separator,
    /// `data:` line whose payload decodes as a chunk.
    Chunk(Box<ChatCompletionChunk>),
    /// `data: [DONE]` terminator.
    Done,
    /// Anything else (comments, `event:`/`id:` fields, undecodable data):
    /// forwarded verbatim.
    Other,
}

/// Classify one line (without its trailing newline).
pub fn classify_line(line: &str) -> SseLine {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return SseLine::Separator;
    }

    let Some(data) = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))
    else {
        return SseLine::Other;
    };

    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => SseLine::Chunk(Box::new(chunk)),
        Err(_) => SseLine::Other,
    }
}

/// Frame a normalized chunk as a single `data:` line.
pub fn encode_chunk(chunk: &ChatCompletionChunk) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n", serde_json::to_string(chunk)?))
}

const SSE_LINE_STARTS: [&[u8]; 3] = [b"data:", b"event:", b":"];

/// Detect whether a response body looks like an SSE stream.
///
/// SSE streams start with `data:`, `event:`, or a `:` comment.
/// Non-SSE responses (JSON error bodies, HTML) do not. Returns `None` while
/// the buffered prefix is too short to tell, e.g. only whitespace or `da`.
pub fn detect_sse(head: &[u8]) -> Option<bool> {
    // Bytes only: the prefix may end inside a multi-byte character.
    let start = head.iter().position(|b| !b.is_ascii_whitespace())?;
    let head = &head[start..];
    for marker in SSE_LINE_STARTS {
        if head.starts_with(marker) {
            return Some(true);
        }
        if marker.starts_with(head) {
            return None;
        }
    }
    Some(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_separator() {
        assert_eq!(classify_line(""), SseLine::Separator);
        assert_eq!(classify_line("  \r"), SseLine::Separator);
    }

    #[test]
    fn done_marker() {
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line("data:[DONE]"), SseLine::Done);
    }

    #[test]
    fn chunk_line_decodes() {
        let line = r#"data: {"id":"c1","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":null}]}"#;
        match classify_line(line) {
            SseLine::Chunk(chunk) => {
                assert_eq!(chunk.id, "c1");
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn data_without_space_decodes() {
        let line = r#"data:{"id":"c1","choices":[]}"#;
        assert!(matches!(classify_line(line), SseLine::Chunk(_)));
    }

    #[test]
    fn comments_and_fields_are_other() {
        assert_eq!(classify_line(": keep-alive"), SseLine::Other);
        assert_eq!(classify_line("event: ping"), SseLine::Other);
        assert_eq!(classify_line("id: 42"), SseLine::Other);
    }

    #[test]
    fn undecodable_data_is_other() {
        assert_eq!(classify_line("data: {not json"), SseLine::Other);
        assert_eq!(classify_line("data: 42"), SseLine::Other);
    }

    #[test]
    fn error_payload_decodes_without_choices() {
        match classify_line(r#"data: {"error":{"message":"overloaded"}}"#) {
            SseLine::Chunk(chunk) => {
                assert!(chunk.choices.is_empty());
                assert_eq!(chunk.extra["error"]["message"], "overloaded");
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn encode_produces_single_data_line() {
        let chunk = ChatCompletionChunk {
            id: "c1".into(),
            ..Default::default()
        };
        let line = encode_chunk(&chunk).unwrap();
        assert!(line.starts_with("data: {"));
        assert!(line.ends_with("}\n"));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn sse_detection() {
        assert_eq!(detect_sse(b"data: {}\n\n"), Some(true));
        assert_eq!(detect_sse(b"\n\ndata: {}"), Some(true));
        assert_eq!(detect_sse(b"event: message_start\n"), Some(true));
        assert_eq!(detect_sse(b": ping\n"), Some(true));
        assert_eq!(detect_sse(b"{\"error\":\"bad\"}"), Some(false));
        assert_eq!(detect_sse(&[0xff, 0xfe]), Some(false));
    }

    #[test]
    fn short_prefix_is_undecided() {
        assert_eq!(detect_sse(b""), None);
        assert_eq!(detect_sse(b"\n"), None);
        assert_eq!(detect_sse(b"\r\n  "), None);
        assert_eq!(detect_sse(b"da"), None);
        assert_eq!(detect_sse(b"\neve"), None);
        assert_eq!(detect_sse(b"dx"), Some(false));
    }
}
