//! Turn delimiters used when rendering a conversation.

use serde::{Deserialize, Serialize};

/// ChatML-style turn delimiters.
///
/// The defaults match Qwen-family models; other models converted for the
/// NPU runtime keep the tokenizer's own delimiters, which can be supplied
/// through settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTemplate {
    pub turn_start: String,
    pub turn_end: String,
}

impl ChatTemplate {
    pub fn new(turn_start: impl Into<String>, turn_end: impl Into<String>) -> Self {
        Self {
            turn_start: turn_start.into(),
            turn_end: turn_end.into(),
        }
    }

    /// The opener that primes the model to answer as the assistant.
    #[must_use]
    pub fn assistant_opener(&self) -> String {
        format!("{}assistant\n", self.turn_start)
    }
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::new("<|im_start|>", "<|im_end|>")
    }
}
