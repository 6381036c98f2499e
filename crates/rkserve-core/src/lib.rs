//! Core domain types, ports and the request pipeline for rkserve.
//!
//! The crate owns everything between an HTTP adapter and the inference
//! engine: the admission gate that serializes access to the single NPU,
//! the prompt renderer, the streaming tag demultiplexer and the buffered
//! output parser. Adapters live in `rkserve-proxy`, the process-backed
//! engine in `rkserve-runtime`.

#![deny(unsafe_code)]

pub mod domain;
pub mod gate;
pub mod markers;
pub mod parse;
pub mod ports;
pub mod prompt;
pub mod services;
pub mod settings;
pub mod stream;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types for convenience
pub use domain::{
    ContentError, ContentPart, ConversationMessage, ImageSource, MessageContent, MessageRole,
    Segment, SegmentKind, ToolInvocation, ToolSchema,
};
pub use gate::{AdmissionGate, AdmissionPermit, AdmissionPolicy, BusyError, PollPolicy};
pub use parse::{ParsedOutput, ToolCallParseError, parse_output};
pub use ports::{FragmentStream, GenerationError, InferenceEngine, ReadinessProbe};
pub use prompt::{
    ChatTemplate, ImageStore, PromptRenderer, RenderError, RenderedPrompt, inject_tool_prompt,
};
pub use services::{ChatError, ChatRequest, ChatService, Completion};
pub use settings::{
    DEFAULT_HOST, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, Settings,
    SettingsError, model_id_from_path, validate_settings,
};
pub use stream::{SegmentStream, StreamDemultiplexer, Utf8Assembler};
