//! Tool catalog injection.
//!
//! The NPU runtime has no native function-calling support, so tools are
//! described to the model in a system message together with the exact
//! block format it must emit to call one.

use crate::domain::{ContentPart, ConversationMessage, MessageContent, MessageRole, ToolSchema};
use crate::markers::{TOOL_CALL_CLOSE, TOOL_CALL_OPEN};

/// Build the system text describing `tools` and the call contract.
#[must_use]
pub fn tool_catalog_prompt(tools: &[ToolSchema]) -> String {
    let mut prompt = String::from(
        "# Tools\n\n\
         You may call one or more functions to assist with the user query.\n\n\
         You are provided with function signatures within <tools></tools> XML tags:\n\
         <tools>\n",
    );

    for tool in tools {
        prompt.push_str(&tool.catalog_entry().to_string());
        prompt.push('\n');
    }

    prompt.push_str("</tools>\n\n");
    prompt.push_str(
        "For each function call, return a json object with function name and arguments \
         within ",
    );
    prompt.push_str(TOOL_CALL_OPEN);
    prompt.push_str(TOOL_CALL_CLOSE);
    prompt.push_str(" XML tags:\n");
    prompt.push_str(TOOL_CALL_OPEN);
    prompt.push_str("\n{\"name\": <function-name>, \"arguments\": <args-json-object>}\n");
    prompt.push_str(TOOL_CALL_CLOSE);
    prompt
}

/// Return a copy of `messages` with the tool catalog in the system turn.
///
/// A leading system message gets the catalog prepended to its text;
/// otherwise a new system message is inserted first. The input is not
/// modified, and an empty tool list returns an unchanged copy.
#[must_use]
pub fn inject_tool_prompt(
    messages: &[ConversationMessage],
    tools: &[ToolSchema],
) -> Vec<ConversationMessage> {
    let mut augmented = messages.to_vec();
    if tools.is_empty() {
        return augmented;
    }

    let catalog = tool_catalog_prompt(tools);

    match augmented.first_mut() {
        Some(first) if first.role == MessageRole::System => {
            first.content = match std::mem::take(&mut first.content) {
                MessageContent::Text(existing) => {
                    MessageContent::Text(format!("{catalog}\n\n{existing}"))
                }
                MessageContent::Parts(mut parts) => {
                    parts.insert(0, ContentPart::text(format!("{catalog}\n\n")));
                    MessageContent::Parts(parts)
                }
            };
        }
        _ => augmented.insert(0, ConversationMessage::system(catalog)),
    }

    augmented
}
