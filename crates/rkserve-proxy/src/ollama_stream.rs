//! NDJSON streaming for Ollama compatibility.
//!
//! Ollama streams newline-delimited JSON: one object per segment, then a
//! terminal object with `done: true` and timing stats.

use std::time::Instant;

use axum::{
    body::Body,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use rkserve_core::{Segment, SegmentKind, SegmentStream};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::GENERATION_FAILED;
use crate::ollama_models::{
    OllamaChatMessage, OllamaChatStreamChunk, elapsed_nanos, now_rfc3339,
};

const NDJSON: &str = "application/x-ndjson";

/// Stream live segments to an Ollama client.
pub fn stream_chat_response(segments: SegmentStream, model: String, start: Instant) -> Response {
    ndjson_response(Body::from_stream(segments_to_ndjson(segments, model, start)))
}

/// Send one object as a complete NDJSON body.
pub fn single_line_response<T: Serialize>(value: &T) -> Response {
    ndjson_response(Body::from(ndjson_line(value)))
}

fn ndjson_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, NDJSON)
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// State threaded through the `unfold` stream.
struct NdjsonState {
    segments: SegmentStream,
    model: String,
    start: Instant,
    eval_count: u32,
    done: bool,
}

fn segments_to_ndjson(
    segments: SegmentStream,
    model: String,
    start: Instant,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let state = NdjsonState {
        segments,
        model,
        start,
        eval_count: 0,
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        match st.segments.next().await {
            Some(Ok(segment)) => {
                st.eval_count = st.eval_count.saturating_add(1);
                let line = ndjson_line(&content_chunk(&st.model, segment));
                Some((Ok(line), st))
            }
            Some(Err(e)) => {
                warn!(segments = st.eval_count, "Stream aborted: {e}");
                st.done = true;
                let line = ndjson_line(&final_chunk(&st, Some(GENERATION_FAILED.to_string())));
                Some((Ok(line), st))
            }
            None => {
                info!(
                    segments = st.eval_count,
                    elapsed_ms = st.start.elapsed().as_millis(),
                    "Completed streaming response"
                );
                st.done = true;
                let line = ndjson_line(&final_chunk(&st, None));
                Some((Ok(line), st))
            }
        }
    })
}

/// A single segment as a `done: false` chunk.
fn content_chunk(model: &str, segment: Segment) -> OllamaChatStreamChunk {
    let message = match segment.kind {
        SegmentKind::Content => OllamaChatMessage::assistant(segment.text),
        SegmentKind::Thinking => OllamaChatMessage::thinking(segment.text),
    };
    OllamaChatStreamChunk {
        model: model.to_string(),
        created_at: now_rfc3339(),
        message,
        done: false,
        done_reason: None,
        total_duration: None,
        eval_count: None,
        error: None,
    }
}

/// The terminal `done: true` chunk, carrying the error if the stream failed.
fn final_chunk(st: &NdjsonState, error: Option<String>) -> OllamaChatStreamChunk {
    let done_reason = if error.is_some() { "error" } else { "stop" };
    OllamaChatStreamChunk {
        model: st.model.clone(),
        created_at: now_rfc3339(),
        message: OllamaChatMessage::assistant(String::new()),
        done: true,
        done_reason: Some(done_reason.to_string()),
        total_duration: Some(elapsed_nanos(st.start)),
        eval_count: Some(st.eval_count),
        error,
    }
}

fn ndjson_line<T: Serialize>(value: &T) -> Bytes {
    let mut out = serde_json::to_vec(value).unwrap_or_default();
    out.push(b'\n');
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thinking_chunk_shape() {
        let chunk = content_chunk("qwen3", Segment::thinking("hmm"));
        let value = serde_json::to_value(chunk).unwrap();
        assert_eq!(value["message"]["thinking"], "hmm");
        assert_eq!(value["message"]["content"], "");
        assert_eq!(value["done"], false);
        assert!(value.get("done_reason").is_none());
    }

    #[test]
    fn test_lines_are_newline_terminated() {
        let line = ndjson_line(&serde_json::json!({"a": 1}));
        assert_eq!(&line[..], b"{\"a\":1}\n");
    }
}
