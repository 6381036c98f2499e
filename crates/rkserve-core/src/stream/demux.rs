//! Incremental thinking/content demultiplexer.
//!
//! Splits a live text stream into content and thinking segments. Any buffer
//! suffix that could still be the beginning of the marker being searched
//! for is withheld, so a marker split across fragments is never emitted as
//! text. Classification therefore does not depend on fragment boundaries.

use crate::domain::Segment;
use crate::markers::{THINK_CLOSE, THINK_OPEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    Thinking,
}

impl Mode {
    /// The marker that ends the current mode.
    const fn marker(self) -> &'static str {
        match self {
            Self::Plain => THINK_OPEN,
            Self::Thinking => THINK_CLOSE,
        }
    }

    const fn toggled(self) -> Self {
        match self {
            Self::Plain => Self::Thinking,
            Self::Thinking => Self::Plain,
        }
    }
}

/// Classifies fragments into [`Segment`]s in arrival order.
#[derive(Debug)]
pub struct StreamDemultiplexer {
    buffer: String,
    mode: Mode,
    emit_thinking: bool,
}

impl StreamDemultiplexer {
    /// Create a demultiplexer in plain mode.
    ///
    /// Thinking text is only emitted when `emit_thinking` is set; otherwise
    /// it is dropped.
    pub const fn new(emit_thinking: bool) -> Self {
        Self {
            buffer: String::new(),
            mode: Mode::Plain,
            emit_thinking,
        }
    }

    /// Feed one fragment and return the segments it resolves.
    pub fn push(&mut self, fragment: &str) -> Vec<Segment> {
        self.buffer.push_str(fragment);
        let mut out = Vec::new();

        loop {
            let marker = self.mode.marker();

            if let Some(pos) = self.buffer.find(marker) {
                let before: String = self.buffer.drain(..pos).collect();
                self.emit(before, &mut out);
                self.buffer.drain(..marker.len());
                self.mode = self.mode.toggled();
                continue;
            }

            let held = partial_marker_len(&self.buffer, marker);
            let ready_len = self.buffer.len() - held;
            let ready: String = self.buffer.drain(..ready_len).collect();
            self.emit(ready, &mut out);
            break;
        }

        out
    }

    /// Flush the withheld tail at end of stream.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        self.emit(rest, &mut out);
        out
    }

    fn emit(&self, text: String, out: &mut Vec<Segment>) {
        if text.is_empty() {
            return;
        }
        match self.mode {
            Mode::Plain => out.push(Segment::content(text)),
            Mode::Thinking if self.emit_thinking => out.push(Segment::thinking(text)),
            Mode::Thinking => {}
        }
    }
}

/// Length of the longest proper prefix of `marker` that `buffer` ends with.
fn partial_marker_len(buffer: &str, marker: &str) -> usize {
    let longest = marker.len().saturating_sub(1).min(buffer.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            let start = buffer.len() - len;
            buffer.is_char_boundary(start) && marker.starts_with(&buffer[start..])
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SegmentKind;

    fn run(fragments: &[&str], emit_thinking: bool) -> Vec<Segment> {
        let mut demux = StreamDemultiplexer::new(emit_thinking);
        let mut out = Vec::new();
        for fragment in fragments {
            out.extend(demux.push(fragment));
        }
        out.extend(demux.finish());
        out
    }

    /// Join adjacent segments of the same kind.
    fn merged(segments: Vec<Segment>) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::new();
        for segment in segments {
            match out.last_mut() {
                Some(last) if last.kind == segment.kind => last.text.push_str(&segment.text),
                _ => out.push(segment),
            }
        }
        out
    }

    #[test]
    fn test_marker_split_across_fragments() {
        let out = run(&["<th", "ink>Hello</thi", "nk>World"], true);
        assert_eq!(
            out,
            vec![Segment::thinking("Hello"), Segment::content("World")]
        );
    }

    #[test]
    fn test_thinking_dropped_when_not_requested() {
        let out = run(&["<th", "ink>Hello</thi", "nk>World"], false);
        assert_eq!(out, vec![Segment::content("World")]);
    }

    #[test]
    fn test_plain_text_is_emitted_immediately() {
        let mut demux = StreamDemultiplexer::new(true);
        assert_eq!(demux.push("Hello "), vec![Segment::content("Hello ")]);
        assert_eq!(demux.push("world"), vec![Segment::content("world")]);
        assert!(demux.finish().is_empty());
    }

    #[test]
    fn test_ambiguous_tail_is_withheld() {
        let mut demux = StreamDemultiplexer::new(true);
        assert_eq!(demux.push("a <thi"), vec![Segment::content("a ")]);
        assert_eq!(demux.push("s is not a tag"), vec![Segment::content("<this is not a tag")]);
    }

    #[test]
    fn test_non_marker_angle_bracket_is_not_held() {
        let mut demux = StreamDemultiplexer::new(true);
        assert_eq!(demux.push("x < y"), vec![Segment::content("x < y")]);
    }

    #[test]
    fn test_unterminated_thinking_flushes_as_thinking() {
        let out = run(&["<think>still going"], true);
        assert_eq!(out, vec![Segment::thinking("still going")]);
        let out = run(&["<think>still going"], false);
        assert!(out.is_empty());
    }

    #[test]
    fn test_partial_marker_flushed_at_end() {
        let out = run(&["answer <thin"], true);
        assert_eq!(merged(out), vec![Segment::content("answer <thin")]);
    }

    #[test]
    fn test_multiple_spans_keep_order() {
        let out = run(&["a<think>b</think>c<think>d</think>e"], true);
        assert_eq!(
            out,
            vec![
                Segment::content("a"),
                Segment::thinking("b"),
                Segment::content("c"),
                Segment::thinking("d"),
                Segment::content("e"),
            ]
        );
    }

    #[test]
    fn test_stray_close_marker_in_plain_mode_is_content() {
        let out = run(&["ok</think>fine"], true);
        assert_eq!(merged(out), vec![Segment::content("ok</think>fine")]);
    }

    #[test]
    fn test_multibyte_text_near_marker() {
        let out = run(&["思考<", "think>推理</", "think>答案"], true);
        assert_eq!(
            out,
            vec![
                Segment::content("思考"),
                Segment::thinking("推理"),
                Segment::content("答案"),
            ]
        );
    }

    #[test]
    fn test_chunk_invariance_over_every_two_and_three_way_split() {
        let raw = "pre<think>\nreason < a </thin b\n</think>\n\n<tool_call>\n{\"name\":\"f\",\"arguments\":{}}\n</tool_call> tail<";
        for emit_thinking in [true, false] {
            let whole = merged(run(&[raw], emit_thinking));
            let boundaries: Vec<usize> = (0..=raw.len()).filter(|&i| raw.is_char_boundary(i)).collect();

            for &i in &boundaries {
                let split = merged(run(&[&raw[..i], &raw[i..]], emit_thinking));
                assert_eq!(split, whole, "split at {i}");
            }

            for &i in &boundaries {
                for &j in boundaries.iter().filter(|&&j| j >= i) {
                    let split = merged(run(&[&raw[..i], &raw[i..j], &raw[j..]], emit_thinking));
                    assert_eq!(split, whole, "split at {i},{j}");
                }
            }
        }
    }

    #[test]
    fn test_chunk_invariance_char_by_char() {
        let raw = "<think>a</think>b<think></think><thinkc</think>";
        let whole = merged(run(&[raw], true));
        let chars: Vec<String> = raw.chars().map(String::from).collect();
        let refs: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(merged(run(&refs, true)), whole);
    }

    #[test]
    fn test_segments_partition_output_without_markers() {
        let raw = "A<think>B</think>C<think>D";
        let out = run(&[raw], true);
        let joined: String = out.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, "ABCD");
        assert_eq!(
            out.iter().map(|s| s.kind).collect::<Vec<_>>(),
            vec![
                SegmentKind::Content,
                SegmentKind::Thinking,
                SegmentKind::Content,
                SegmentKind::Thinking
            ]
        );
    }
}
