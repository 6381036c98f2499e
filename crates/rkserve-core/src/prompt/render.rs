//! Conversation → prompt rendering.
//!
//! Each message renders as `{turn_start}{role}\n{text}[ /nothink]{turn_end}\n`
//! and the prompt always ends with the assistant opener so generation
//! starts on the assistant's turn.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::images::{ImageArtifacts, ImageStore};
use super::template::ChatTemplate;
use crate::domain::{ContentPart, ConversationMessage, ImageSource, MessageContent};
use crate::markers::{IMAGE_CLOSE, IMAGE_OPEN, NO_THINK_SUFFIX, THINK_CLOSE, THINK_OPEN};

/// Matches a complete reasoning span, across newlines.
static THINK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("Valid regex pattern"));

/// Errors that can occur while rendering a prompt.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An inline image could not be written to the artifact directory.
    #[error("Failed to persist inline image: {0}")]
    ImageStore(#[from] std::io::Error),
}

/// A fully rendered prompt and the files it references.
///
/// The text is immutable. Image artifacts are removed when the prompt is
/// dropped, so the value must outlive the generation that consumes it.
#[derive(Debug)]
pub struct RenderedPrompt {
    text: String,
    artifacts: ImageArtifacts,
}

impl RenderedPrompt {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn artifacts(&self) -> &ImageArtifacts {
        &self.artifacts
    }
}

impl AsRef<str> for RenderedPrompt {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Renders conversations with a fixed template.
#[derive(Debug, Clone, Default)]
pub struct PromptRenderer {
    template: ChatTemplate,
    images: ImageStore,
}

impl PromptRenderer {
    pub const fn new(template: ChatTemplate, images: ImageStore) -> Self {
        Self { template, images }
    }

    pub const fn template(&self) -> &ChatTemplate {
        &self.template
    }

    /// Render `messages` into a single prompt string.
    ///
    /// When `thinking` is false every message is suffixed with ` /nothink`.
    pub fn render(
        &self,
        messages: &[ConversationMessage],
        thinking: bool,
    ) -> Result<RenderedPrompt, RenderError> {
        let mut artifacts = self.images.scope();
        let mut prompt = String::new();

        for message in messages {
            let text = flatten_content(&message.content, &mut artifacts)?;

            prompt.push_str(&self.template.turn_start);
            prompt.push_str(message.role.as_str());
            prompt.push('\n');
            prompt.push_str(&text);
            if !thinking {
                prompt.push_str(NO_THINK_SUFFIX);
            }
            prompt.push_str(&self.template.turn_end);
            prompt.push('\n');
        }

        prompt.push_str(&self.template.assistant_opener());

        debug!(
            messages = messages.len(),
            images = artifacts.paths().len(),
            chars = prompt.len(),
            thinking,
            "Rendered prompt"
        );

        Ok(RenderedPrompt {
            text: prompt,
            artifacts,
        })
    }
}

/// Resolve message content to flat text.
///
/// Image markers (in encounter order) are placed before the message's
/// accumulated text; prior reasoning is stripped from the text.
fn flatten_content(
    content: &MessageContent,
    artifacts: &mut ImageArtifacts,
) -> Result<String, RenderError> {
    let parts = match content {
        MessageContent::Text(text) => return Ok(strip_thinking(text).into_owned()),
        MessageContent::Parts(parts) => parts,
    };

    let mut markers = String::new();
    let mut text = String::new();

    for part in parts {
        match part {
            ContentPart::Text { text: value } => text.push_str(value),
            ContentPart::Image { source } => {
                let location = match source {
                    ImageSource::Reference(location) => location.clone(),
                    ImageSource::Inline { media_type, data } => artifacts
                        .persist(media_type, data)?
                        .to_string_lossy()
                        .into_owned(),
                };
                markers.push_str(IMAGE_OPEN);
                markers.push_str(&location);
                markers.push_str(IMAGE_CLOSE);
            }
        }
    }

    markers.push_str(&strip_thinking(&text));
    Ok(markers)
}

/// Remove reasoning spans, and any unpaired markers, from historical text.
pub fn strip_thinking(text: &str) -> Cow<'_, str> {
    if !text.contains(THINK_OPEN) && !text.contains(THINK_CLOSE) {
        return Cow::Borrowed(text);
    }

    // Each removal can splice its neighbours into a fresh marker, so repeat
    // until nothing changes.
    let mut current = text.to_string();
    loop {
        let next = THINK_SPAN
            .replace_all(&current, "")
            .replace(THINK_OPEN, "")
            .replace(THINK_CLOSE, "");
        if next == current {
            return Cow::Owned(current);
        }
        current = next;
    }
}
