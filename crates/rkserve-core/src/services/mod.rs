//! Application services.
//!
//! Services orchestrate the core components for one request and are
//! shared by every protocol adapter.

mod chat;

pub use chat::{ChatError, ChatRequest, ChatService, Completion};
