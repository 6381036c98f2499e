//! OpenAI API data models for request/response handling.
//!
//! This module contains types that match the OpenAI API specification.
//! Domain types live in `rkserve-core`; this module handles the API layer mapping.

use rkserve_core::{ConversationMessage, ParsedOutput, ToolInvocation, ToolSchema};
use serde::{Deserialize, Serialize};

/// Value of `owned_by` in model listings.
pub const MODEL_OWNER: &str = "rkserve";

// =============================================================================
// Tool Calling Types
// =============================================================================

/// A tool call made by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call.
    pub id: String,
    /// Tool type - always "function".
    pub r#type: String,
    /// Function call details.
    pub function: ToolCallFunction,
}

/// Function call details within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Name of the function to call.
    pub name: String,
    /// JSON string of arguments.
    pub arguments: String,
}

impl From<&ToolInvocation> for ToolCall {
    fn from(call: &ToolInvocation) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            r#type: "function".to_string(),
            function: ToolCallFunction {
                name: call.name.clone(),
                arguments: call.arguments_json(),
            },
        }
    }
}

/// Streaming delta for tool calls.
///
/// Calls are only known once generation has finished, so each delta
/// carries a complete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Index of the tool call (for parallel tool calls).
    pub index: u32,
    pub id: String,
    pub r#type: String,
    pub function: ToolCallFunction,
}

impl ToolCallDelta {
    fn from_call(index: u32, call: ToolCall) -> Self {
        Self {
            index,
            id: call.id,
            r#type: call.r#type,
            function: call.function,
        }
    }
}

// =============================================================================
// Chat Completion Request/Response Types
// =============================================================================

/// Request to /v1/chat/completions endpoint.
///
/// Sampling parameters are fixed when the model is loaded on the NPU, so
/// fields such as `temperature` are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model name; informational only, a single model is served.
    #[serde(default)]
    pub model: Option<String>,
    /// Array of chat messages.
    pub messages: Vec<ConversationMessage>,
    /// Tool definitions for function calling.
    #[serde(default)]
    pub tools: Option<Vec<ToolSchema>>,
    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
    /// Whether the model should reason before answering.
    #[serde(default = "default_think")]
    pub think: bool,
}

const fn default_think() -> bool {
    true
}

/// Assistant message in a non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl From<&ParsedOutput> for ResponseMessage {
    fn from(output: &ParsedOutput) -> Self {
        Self {
            role: "assistant".to_string(),
            content: output.content.clone(),
            reasoning_content: output.thinking.clone(),
            tool_calls: output
                .has_tool_calls()
                .then(|| output.tool_calls.iter().map(ToolCall::from).collect()),
        }
    }
}

/// Response from /v1/chat/completions endpoint (non-streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

/// A single chat completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

/// Streaming chunk from /v1/chat/completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

/// A single streaming choice. `finish_reason` is `null` until the last chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl ChatDelta {
    /// A delta carrying a whole buffered result.
    pub fn from_output(output: &ParsedOutput) -> Self {
        let message = ResponseMessage::from(output);
        Self {
            role: Some(message.role),
            content: Some(message.content),
            reasoning_content: message.reasoning_content,
            tool_calls: message.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .zip(0..)
                    .map(|(call, index)| ToolCallDelta::from_call(index, call))
                    .collect()
            }),
        }
    }
}

/// Token usage statistics.
///
/// The runtime emits roughly one fragment per token, so completion tokens
/// are counted as fragments. Prompt tokens are not reported by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn from_fragments(fragments: usize) -> Self {
        let completion_tokens = u32::try_from(fragments).unwrap_or(u32::MAX);
        Self {
            prompt_tokens: 0,
            completion_tokens,
            total_tokens: completion_tokens,
        }
    }
}

/// `finish_reason` for a finished generation.
pub fn finish_reason(output: &ParsedOutput) -> &'static str {
    if output.has_tool_calls() {
        "tool_calls"
    } else {
        "stop"
    }
}

// =============================================================================
// Models Endpoint Types
// =============================================================================

/// Response from /v1/models endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelsResponse {
    /// Listing containing the single served model.
    pub fn single(model_id: &str, created: i64) -> Self {
        Self {
            object: "list".to_string(),
            data: vec![ModelInfo {
                id: model_id.to_string(),
                object: "model".to_string(),
                created,
                owned_by: MODEL_OWNER.to_string(),
            }],
        }
    }
}

/// Information about a single model (OpenAI format).
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

// =============================================================================
// Error Response Types
// =============================================================================

/// Error response matching OpenAI format.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail within an error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create an error response with a code.
    pub fn with_code(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: Some(code.into()),
            },
        }
    }

    /// The NPU is occupied by another request.
    pub fn server_busy() -> Self {
        Self::with_code(
            "Server is busy, please try again later",
            "server_error",
            "server_busy",
        )
    }

    /// The request body could not be understood.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_code(message, "invalid_request_error", "invalid_request")
    }

    /// Generation or rendering failed.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_code(message, "server_error", "internal_error")
    }
}
