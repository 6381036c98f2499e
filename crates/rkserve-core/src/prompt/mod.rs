//! Prompt construction.
//!
//! Turns a structured conversation into the flat, delimiter-separated
//! string the engine consumes, optionally augmented with a tool catalog.

mod images;
mod render;
mod template;
mod tools;

pub use images::{ImageArtifacts, ImageStore};
pub use render::{PromptRenderer, RenderError, RenderedPrompt, strip_thinking};
pub use template::ChatTemplate;
pub use tools::{inject_tool_prompt, tool_catalog_prompt};
