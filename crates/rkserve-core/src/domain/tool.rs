//! Tool definitions and extracted invocations.
//!
//! Tool schemas are opaque: the parameters tree is carried as a JSON value
//! and only ever serialized back into the prompt.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireTool")]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The catalog entry written into the system prompt.
    #[must_use]
    pub fn catalog_entry(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Both protocols wrap the function under `{"type":"function","function":{..}}`;
/// the flat form is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTool {
    Wrapped { function: WireFunction },
    Flat(WireFunction),
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
}

impl From<WireTool> for ToolSchema {
    fn from(tool: WireTool) -> Self {
        let (WireTool::Wrapped { function } | WireTool::Flat(function)) = tool;
        Self {
            name: function.name,
            description: function.description.unwrap_or_default(),
            parameters: function
                .parameters
                .unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

/// A tool call extracted from completed model output.
///
/// Arguments are only checked to be a well-formed JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    /// Arguments as a compact JSON string (OpenAI carries them this way).
    #[must_use]
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}
