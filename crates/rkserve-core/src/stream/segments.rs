//! Async segment stream over a generator.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use super::demux::StreamDemultiplexer;
use super::utf8::Utf8Assembler;
use crate::domain::Segment;
use crate::gate::AdmissionPermit;
use crate::ports::{FragmentStream, GenerationError};
use crate::prompt::RenderedPrompt;

/// Classified output of one generation.
///
/// Owns the admission permit and the rendered prompt. Both are released
/// when the generator is exhausted or when this stream is dropped, which is
/// what happens when a client disconnects mid-response.
pub struct SegmentStream {
    inner: BoxStream<'static, Result<Segment, GenerationError>>,
}

/// State threaded through the `unfold` stream.
struct SegmentState {
    fragments: FragmentStream,
    utf8: Utf8Assembler,
    demux: StreamDemultiplexer,
    pending: VecDeque<Segment>,
    failure: Option<GenerationError>,
    finished: bool,
    fragment_count: usize,
    _permit: AdmissionPermit,
    _prompt: RenderedPrompt,
}

impl SegmentStream {
    pub fn new(
        fragments: FragmentStream,
        emit_thinking: bool,
        permit: AdmissionPermit,
        prompt: RenderedPrompt,
    ) -> Self {
        let state = SegmentState {
            fragments,
            utf8: Utf8Assembler::new(),
            demux: StreamDemultiplexer::new(emit_thinking),
            pending: VecDeque::new(),
            failure: None,
            finished: false,
            fragment_count: 0,
            _permit: permit,
            _prompt: prompt,
        };

        let inner = futures_util::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(segment) = st.pending.pop_front() {
                    return Some((Ok(segment), st));
                }

                if st.finished {
                    return st.failure.take().map(|e| (Err(e), st));
                }

                match st.fragments.next().await {
                    Some(Ok(bytes)) => {
                        st.fragment_count += 1;
                        let text = st.utf8.push(&bytes);
                        st.pending.extend(st.demux.push(&text));
                    }
                    Some(Err(e)) => {
                        warn!(fragments = st.fragment_count, "Generation failed mid-stream: {e}");
                        st.flush();
                        st.failure = Some(e);
                    }
                    None => {
                        debug!(fragments = st.fragment_count, "Generation finished");
                        st.flush();
                    }
                }
            }
        })
        .boxed();

        Self { inner }
    }
}

impl SegmentState {
    fn flush(&mut self) {
        let tail = self.utf8.finish();
        self.pending.extend(self.demux.push(&tail));
        self.pending.extend(self.demux.finish());
        self.finished = true;
    }
}

impl Stream for SegmentStream {
    type Item = Result<Segment, GenerationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for SegmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStream").finish_non_exhaustive()
    }
}
