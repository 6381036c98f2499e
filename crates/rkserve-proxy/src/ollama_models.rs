//! Ollama API data models.
//!
//! Request types translate into the protocol-independent core types;
//! response types mirror what Ollama clients expect on `/api/*`.

use std::time::Instant;

use rkserve_core::{
    ContentError, ContentPart, ConversationMessage, ImageSource, MessageContent, ParsedOutput,
    ToolSchema,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Body of `GET /`.
pub const OLLAMA_ROOT_RESPONSE: &str = "Ollama is running";

/// Ollama version reported by `/api/version`.
///
/// Some clients refuse to talk to servers older than 0.6.4.
pub const OLLAMA_COMPAT_VERSION: &str = "0.6.4";

// ── Requests ───────────────────────────────────────────────────────────

/// `POST /api/chat` body.
///
/// `options`, `format` and `keep_alive` are accepted and ignored; the NPU
/// model's sampling settings are fixed at load time.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<OllamaRequestMessage>,
    #[serde(default)]
    pub tools: Option<Vec<ToolSchema>>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub think: bool,
}

const fn default_stream() -> bool {
    true
}

/// One message of an Ollama chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaRequestMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Base64-encoded images attached to this message.
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

impl OllamaRequestMessage {
    /// Convert to a core message, decoding attached images.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if an image is not valid base64.
    pub fn into_conversation_message(self) -> Result<ConversationMessage, ContentError> {
        let text = self.content.unwrap_or_default();
        let content = match self.images {
            Some(images) if !images.is_empty() => {
                let mut parts = images
                    .iter()
                    .map(|image| {
                        ImageSource::from_base64(image).map(|source| ContentPart::Image { source })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                parts.push(ContentPart::text(text));
                MessageContent::Parts(parts)
            }
            _ => MessageContent::Text(text),
        };
        Ok(ConversationMessage::new(self.role, content))
    }
}

// ── Chat responses ─────────────────────────────────────────────────────

/// Assistant message in a chat response or stream chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
}

impl OllamaChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            thinking: None,
            tool_calls: None,
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            thinking: Some(text.into()),
            ..Self::assistant(String::new())
        }
    }
}

impl From<&ParsedOutput> for OllamaChatMessage {
    fn from(output: &ParsedOutput) -> Self {
        Self {
            role: "assistant".to_string(),
            content: output.content.clone(),
            thinking: output.thinking.clone(),
            tool_calls: output.has_tool_calls().then(|| {
                output
                    .tool_calls
                    .iter()
                    .map(|call| OllamaToolCall {
                        function: OllamaToolCallFunction {
                            name: call.name.clone(),
                            arguments: serde_json::Value::Object(call.arguments.clone()),
                        },
                    })
                    .collect()
            }),
        }
    }
}

/// Ollama tool call; arguments are a JSON object, not a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCallFunction {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Complete (non-streaming or terminal) chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatResponse {
    pub model: String,
    pub created_at: String,
    pub message: OllamaChatMessage,
    pub done: bool,
    pub done_reason: String,
    pub total_duration: u64,
    pub eval_count: u32,
}

/// One NDJSON line of a streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatStreamChunk {
    pub model: String,
    pub created_at: String,
    pub message: OllamaChatMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Model listing ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct OllamaVersionResponse {
    pub version: String,
}

/// `GET /api/tags` response.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaTagsResponse {
    pub models: Vec<OllamaModelEntry>,
}

impl OllamaTagsResponse {
    /// Listing containing the single served model.
    pub fn single(model_id: &str, size: u64, modified_at: &str) -> Self {
        Self {
            models: vec![OllamaModelEntry {
                name: format!("{model_id}:latest"),
                model: format!("{model_id}:latest"),
                modified_at: modified_at.to_string(),
                size,
                digest: synthetic_digest(model_id),
                details: OllamaModelDetails {
                    parent_model: String::new(),
                    format: "rkllm".to_string(),
                    family: String::new(),
                    families: vec![],
                    parameter_size: String::new(),
                    quantization_level: String::new(),
                },
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaModelEntry {
    pub name: String,
    pub model: String,
    pub modified_at: String,
    pub size: u64,
    pub digest: String,
    pub details: OllamaModelDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaModelDetails {
    pub parent_model: String,
    pub format: String,
    pub family: String,
    pub families: Vec<String>,
    pub parameter_size: String,
    pub quantization_level: String,
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Strip the `:latest` tag Ollama clients append to model names.
pub fn normalize_model_name(name: &str) -> &str {
    name.strip_suffix(":latest").unwrap_or(name)
}

/// Hex SHA-256 of the model name, standing in for a registry blob digest.
pub fn synthetic_digest(model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current time in the RFC 3339 format Ollama uses.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Nanoseconds elapsed since `start`, as Ollama reports durations.
pub fn elapsed_nanos(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
