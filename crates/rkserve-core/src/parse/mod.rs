//! Buffered parsing of a complete generation.
//!
//! Used when the whole output is available at once: non-streaming
//! responses, and streaming requests that carry tools (tool calls can only
//! be extracted once the closing marker has arrived).

mod output;

pub use output::{ParsedOutput, ToolCallParseError, parse_output};
