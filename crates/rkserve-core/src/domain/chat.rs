//! Conversation domain types.
//!
//! Messages arrive from both protocol adapters and are rendered into a
//! single prompt. Content is either plain text or an ordered list of
//! parts; image parts carry either an inline payload or a reference.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Errors raised while decoding message content from the wire.
#[derive(Debug, Error)]
pub enum ContentError {
    /// A `data:` URL or base64 payload could not be decoded.
    #[error("Invalid inline image: {0}")]
    InvalidImage(String),
}

/// The role of a message sender.
///
/// Unknown labels are kept verbatim; the renderer treats the role as an
/// opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
    Other(String),
}

impl MessageRole {
    /// Convert role to its wire label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for MessageRole {
    fn from(label: String) -> Self {
        match label.as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            _ => Self::Other(label),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Decoded payload that must be persisted before the engine can read it.
    Inline { media_type: String, data: Vec<u8> },
    /// A URL or filesystem path passed through unchanged.
    Reference(String),
}

impl ImageSource {
    /// Interpret an OpenAI-style image URL.
    ///
    /// `data:<mime>;base64,<payload>` URLs are decoded; anything else is a
    /// reference.
    pub fn from_url(url: &str) -> Result<Self, ContentError> {
        let Some(rest) = url.strip_prefix("data:") else {
            return Ok(Self::Reference(url.to_string()));
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ContentError::InvalidImage("data URL has no payload".to_string()))?;

        let Some(media_type) = header.strip_suffix(";base64") else {
            return Err(ContentError::InvalidImage(format!(
                "unsupported data URL encoding: {header}"
            )));
        };

        let data = decode_base64(payload)?;
        let media_type = if media_type.is_empty() {
            sniff_media_type(&data).to_string()
        } else {
            media_type.to_string()
        };

        Ok(Self::Inline { media_type, data })
    }

    /// Decode a bare base64 payload (the Ollama `images` field).
    pub fn from_base64(payload: &str) -> Result<Self, ContentError> {
        let data = decode_base64(payload)?;
        Ok(Self::Inline {
            media_type: sniff_media_type(&data).to_string(),
            data,
        })
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, ContentError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ContentError::InvalidImage(e.to_string()))
}

/// Guess a media type from magic bytes.
fn sniff_media_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'B', b'M', ..] => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// One element of structured message content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WirePart")]
pub enum ContentPart {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Accepted wire shapes for a content part.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
    Image { image: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireImageUrl {
    Bare(String),
    Object { url: String },
}

impl TryFrom<WirePart> for ContentPart {
    type Error = ContentError;

    fn try_from(part: WirePart) -> Result<Self, Self::Error> {
        Ok(match part {
            WirePart::Text { text } => Self::Text { text },
            WirePart::ImageUrl {
                image_url: WireImageUrl::Bare(url) | WireImageUrl::Object { url },
            }
            | WirePart::Image { image: url } => Self::Image {
                source: ImageSource::from_url(&url)?,
            },
        })
    }
}

/// Message content: plain text or ordered parts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    /// Missing or `null` content is treated as empty text.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: MessageContent,
}

impl ConversationMessage {
    pub fn new(role: impl Into<MessageRole>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<MessageContent>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_known_and_opaque() {
        assert_eq!(MessageRole::from("tool"), MessageRole::Tool);
        let custom = MessageRole::from("observer");
        assert_eq!(custom, MessageRole::Other("observer".to_string()));
        assert_eq!(custom.as_str(), "observer");
    }

    #[test]
    fn test_plain_text_message() {
        let msg: ConversationMessage =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, MessageContent::Text("hi".to_string()));
    }

    #[test]
    fn test_null_content_is_empty_text() {
        let msg: ConversationMessage =
            serde_json::from_str(r#"{"role":"assistant","content":null}"#).unwrap();
        assert_eq!(msg.content, MessageContent::default());

        let msg: ConversationMessage = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(msg.content, MessageContent::default());
    }

    #[test]
    fn test_parts_with_image_reference_and_data_url() {
        let json = r#"{
            "role": "user",
            "content": [
                {"type": "text", "text": "what is this?"},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}},
                {"type": "image_url", "image_url": "data:image/png;base64,iVBORw0KGgo="}
            ]
        }"#;
        let msg: ConversationMessage = serde_json::from_str(json).unwrap();
        let MessageContent::Parts(parts) = msg.content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], ContentPart::text("what is this?"));
        assert_eq!(
            parts[1],
            ContentPart::Image {
                source: ImageSource::Reference("https://example.com/cat.png".to_string())
            }
        );
        match &parts[2] {
            ContentPart::Image {
                source: ImageSource::Inline { media_type, data },
            } => {
                assert_eq!(media_type, "image/png");
                assert_eq!(&data[..4], &[0x89, b'P', b'N', b'G']);
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_data_url_is_rejected() {
        let json = r#"{"role":"user","content":[{"type":"image_url","image_url":{"url":"data:image/png;base64,@@@"}}]}"#;
        assert!(serde_json::from_str::<ConversationMessage>(json).is_err());
    }

    #[test]
    fn test_unknown_part_type_is_rejected() {
        let json = r#"{"role":"user","content":[{"type":"audio","audio":"x"}]}"#;
        assert!(serde_json::from_str::<ConversationMessage>(json).is_err());
    }

    #[test]
    fn test_base64_sniffs_jpeg() {
        let source = ImageSource::from_base64("/9j/4AAQ").unwrap();
        match source {
            ImageSource::Inline { media_type, .. } => assert_eq!(media_type, "image/jpeg"),
            ImageSource::Reference(_) => panic!("expected inline"),
        }
    }
}
