//! Literal markup the model emits and the renderer produces.

/// Opens a reasoning span.
pub const THINK_OPEN: &str = "<think>";

/// Closes a reasoning span.
pub const THINK_CLOSE: &str = "</think>";

/// Opens a tool invocation block.
pub const TOOL_CALL_OPEN: &str = "<tool_call>";

/// Closes a tool invocation block.
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

/// Wraps an image path or URL inside a rendered message.
pub const IMAGE_OPEN: &str = "<image>";
pub const IMAGE_CLOSE: &str = "</image>";

/// Appended to every message when the caller disables reasoning.
pub const NO_THINK_SUFFIX: &str = " /nothink";
