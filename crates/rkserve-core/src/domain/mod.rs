//! Domain types shared by every layer.
//!
//! These types describe conversations, tools and classified output
//! independent of either wire protocol.

mod chat;
mod segment;
mod tool;

pub use chat::{ContentError, ContentPart, ConversationMessage, ImageSource, MessageContent, MessageRole};
pub use segment::{Segment, SegmentKind};
pub use tool::{ToolInvocation, ToolSchema};
