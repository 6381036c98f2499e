//! Classified units of model output.

/// What a segment of output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Visible answer text.
    Content,
    /// Reasoning text from inside a thinking span.
    Thinking,
}

/// A run of output text with a single classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Content,
            text: text.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Thinking,
            text: text.into(),
        }
    }

    pub const fn is_thinking(&self) -> bool {
        matches!(self.kind, SegmentKind::Thinking)
    }
}
