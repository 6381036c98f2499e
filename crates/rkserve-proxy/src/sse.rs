//! Server-Sent Events encoding for OpenAI streaming responses.
//!
//! Each segment becomes one `chat.completion.chunk`; the stream ends with a
//! chunk carrying `finish_reason` and the literal `data: [DONE]` line.

use std::convert::Infallible;
use std::time::Instant;

use axum::response::sse::{Event, Sse};
use futures_util::{Stream, StreamExt};
use rkserve_core::{Completion, Segment, SegmentKind, SegmentStream};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::GENERATION_FAILED;
use crate::models::{
    ChatChunkChoice, ChatCompletionChunk, ChatDelta, ErrorResponse, finish_reason,
};

const DONE: &str = "[DONE]";

/// Identity shared by every chunk of one response.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ChunkContext {
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
        }
    }

    fn chunk(&self, delta: ChatDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Finished,
    Done,
}

/// State threaded through the `unfold` stream.
struct SseState {
    segments: SegmentStream,
    ctx: ChunkContext,
    phase: Phase,
    emitted: usize,
    start: Instant,
}

/// Stream live segments as OpenAI chunks.
pub fn stream_segments(
    segments: SegmentStream,
    ctx: ChunkContext,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let state = SseState {
        segments,
        ctx,
        phase: Phase::Streaming,
        emitted: 0,
        start: Instant::now(),
    };

    let events = futures_util::stream::unfold(state, |mut st| async move {
        match st.phase {
            Phase::Streaming => match st.segments.next().await {
                Some(Ok(segment)) => {
                    let delta = segment_delta(segment, st.emitted == 0);
                    st.emitted += 1;
                    let event = json_event(&st.ctx.chunk(delta, None));
                    Some((Ok(event), st))
                }
                Some(Err(e)) => {
                    warn!(segments = st.emitted, "Stream aborted: {e}");
                    st.phase = Phase::Finished;
                    let event = json_event(&ErrorResponse::internal(GENERATION_FAILED));
                    Some((Ok(event), st))
                }
                None => {
                    info!(
                        segments = st.emitted,
                        elapsed_ms = st.start.elapsed().as_millis(),
                        "Completed streaming response"
                    );
                    st.phase = Phase::Finished;
                    let event = json_event(&st.ctx.chunk(ChatDelta::default(), Some("stop")));
                    Some((Ok(event), st))
                }
            },
            Phase::Finished => {
                st.phase = Phase::Done;
                Some((Ok(Event::default().data(DONE)), st))
            }
            Phase::Done => None,
        }
    });

    Sse::new(events)
}

/// Stream a buffered result as a single chunk followed by `[DONE]`.
///
/// Used for requests with tools: calls can only be extracted from the
/// complete output.
pub fn stream_completion(
    completion: &Completion,
    ctx: &ChunkContext,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let chunk = ctx.chunk(
        ChatDelta::from_output(&completion.output),
        Some(finish_reason(&completion.output)),
    );
    let events = vec![Ok(json_event(&chunk)), Ok(Event::default().data(DONE))];
    Sse::new(futures_util::stream::iter(events))
}

fn segment_delta(segment: Segment, first: bool) -> ChatDelta {
    let role = first.then(|| "assistant".to_string());
    match segment.kind {
        SegmentKind::Content => ChatDelta {
            role,
            content: Some(segment.text),
            ..ChatDelta::default()
        },
        SegmentKind::Thinking => ChatDelta {
            role,
            reasoning_content: Some(segment.text),
            ..ChatDelta::default()
        },
    }
}

fn json_event<T: Serialize>(value: &T) -> Event {
    Event::default().data(serde_json::to_string(value).unwrap_or_default())
}
