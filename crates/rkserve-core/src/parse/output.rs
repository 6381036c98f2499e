//! Thinking and tool-call extraction from a finished generation.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::ToolInvocation;

static THINK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("Valid regex pattern"));

static TOOL_CALL_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("Valid regex pattern")
});

/// Why a tool-call span was not accepted.
#[derive(Debug, Error)]
pub enum ToolCallParseError {
    #[error("Tool call is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Tool call has no string \"name\" field")]
    MissingName,

    #[error("Tool call \"arguments\" is not a JSON object")]
    InvalidArguments,
}

/// Structured view of a complete generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    /// Visible answer text, trimmed.
    pub content: String,
    /// Reasoning text; only set when thinking was requested and present.
    pub thinking: Option<String>,
    /// Successfully parsed tool calls, in output order.
    pub tool_calls: Vec<ToolInvocation>,
}

impl ParsedOutput {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Split `raw` into content, thinking and tool calls.
///
/// Tool-call spans that fail to parse are left verbatim in the content.
#[must_use]
pub fn parse_output(raw: &str, thinking_enabled: bool) -> ParsedOutput {
    let mut thoughts = Vec::new();
    let without_thinking = THINK_SPAN.replace_all(raw, |caps: &Captures<'_>| {
        thoughts.push(caps[1].trim().to_string());
        ""
    });

    let mut tool_calls = Vec::new();
    let visible = TOOL_CALL_SPAN.replace_all(&without_thinking, |caps: &Captures<'_>| {
        match parse_tool_call(&caps[1]) {
            Ok(call) => {
                tool_calls.push(call);
                String::new()
            }
            Err(e) => {
                warn!("Leaving unparseable tool call in content: {e}");
                caps[0].to_string()
            }
        }
    });

    let thinking = thoughts.join("\n").trim().to_string();
    let thinking = (thinking_enabled && !thinking.is_empty()).then_some(thinking);

    debug!(
        tool_calls = tool_calls.len(),
        thinking_chars = thinking.as_ref().map_or(0, String::len),
        "Parsed buffered output"
    );

    ParsedOutput {
        content: visible.trim().to_string(),
        thinking,
        tool_calls,
    }
}

/// Parse the body of one `<tool_call>` span.
fn parse_tool_call(body: &str) -> Result<ToolInvocation, ToolCallParseError> {
    let value: Value = serde_json::from_str(body.trim())?;

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or(ToolCallParseError::MissingName)?
        .to_string();

    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        // Some models emit the arguments as an encoded JSON string.
        Some(Value::String(encoded)) => match serde_json::from_str(encoded)? {
            Value::Object(map) => map,
            _ => return Err(ToolCallParseError::InvalidArguments),
        },
        Some(_) => return Err(ToolCallParseError::InvalidArguments),
    };

    Ok(ToolInvocation { name, arguments })
}
