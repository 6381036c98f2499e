//! Chat service - runs one admitted request through the pipeline.
//!
//! The caller acquires an [`AdmissionPermit`] first and hands it over; the
//! service keeps it alive until the generator has been consumed (buffered
//! path) or moves it into the returned [`SegmentStream`] (streaming path).

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{ConversationMessage, ToolSchema};
use crate::gate::{AdmissionPermit, BusyError};
use crate::parse::{ParsedOutput, parse_output};
use crate::ports::{GenerationError, InferenceEngine, ReadinessProbe};
use crate::prompt::{PromptRenderer, RenderError, RenderedPrompt, inject_tool_prompt};
use crate::stream::{SegmentStream, Utf8Assembler};

/// Errors surfaced to protocol adapters.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Busy(#[from] BusyError),

    #[error("Failed to render prompt: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl ChatError {
    /// HTTP status code adapters should answer with.
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) => 400,
            Self::Busy(_) => 503,
            Self::Render(_) | Self::Generation(_) => 500,
        }
    }

    /// True when the client may retry the same request later.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Protocol-independent chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolSchema>,
    pub thinking: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ConversationMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub const fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    /// Requests with tools are answered from the buffered parser.
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// Result of a buffered generation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub output: ParsedOutput,
    /// Fragments received from the engine.
    pub fragments: usize,
    /// Wall-clock time from rendering to the last fragment.
    pub elapsed: Duration,
}

/// Orchestrates prompt construction and generation.
#[derive(Debug, Clone)]
pub struct ChatService {
    engine: Arc<dyn InferenceEngine>,
    renderer: Arc<PromptRenderer>,
}

impl ChatService {
    pub fn new(engine: Arc<dyn InferenceEngine>, renderer: PromptRenderer) -> Self {
        Self {
            engine,
            renderer: Arc::new(renderer),
        }
    }

    /// Inject the tool catalog (if any) and render the prompt.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` for an empty conversation and `Render`
    /// when inline images cannot be stored.
    pub fn prepare(&self, request: &ChatRequest) -> Result<RenderedPrompt, ChatError> {
        if request.messages.is_empty() {
            return Err(ChatError::MalformedRequest(
                "messages must not be empty".to_string(),
            ));
        }

        let prompt = if request.has_tools() {
            let messages = inject_tool_prompt(&request.messages, &request.tools);
            self.renderer.render(&messages, request.thinking)?
        } else {
            self.renderer.render(&request.messages, request.thinking)?
        };

        Ok(prompt)
    }

    /// Run a generation to completion and parse the result.
    ///
    /// The permit is held until the generator is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if rendering fails or the engine fails at any
    /// point; partial output is discarded.
    pub async fn complete(
        &self,
        permit: AdmissionPermit,
        request: &ChatRequest,
    ) -> Result<Completion, ChatError> {
        let started = Instant::now();
        let prompt = self.prepare(request)?;
        let mut fragments = self.engine.generate(prompt.text()).await?;

        let mut utf8 = Utf8Assembler::new();
        let mut raw = String::new();
        let mut count = 0;
        while let Some(fragment) = fragments.next().await {
            raw.push_str(&utf8.push(&fragment?));
            count += 1;
        }
        raw.push_str(&utf8.finish());

        drop(fragments);
        drop(prompt);
        drop(permit);

        let elapsed = started.elapsed();
        info!(
            fragments = count,
            chars = raw.len(),
            elapsed_ms = elapsed.as_millis(),
            "Completed buffered generation"
        );

        Ok(Completion {
            output: parse_output(&raw, request.thinking),
            fragments: count,
            elapsed,
        })
    }

    /// Start a streaming generation.
    ///
    /// The returned stream owns the permit and the rendered prompt.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if rendering fails or the engine cannot start;
    /// the permit is released in that case.
    pub async fn stream(
        &self,
        permit: AdmissionPermit,
        request: &ChatRequest,
    ) -> Result<SegmentStream, ChatError> {
        let prompt = self.prepare(request)?;
        let fragments = self.engine.generate(prompt.text()).await?;
        debug!(thinking = request.thinking, "Started streaming generation");
        Ok(SegmentStream::new(fragments, request.thinking, permit, prompt))
    }
}

impl ReadinessProbe for ChatService {
    fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Segment;
    use crate::gate::AdmissionGate;
    use crate::testing::ScriptedEngine;
    use serde_json::json;

    fn service(engine: &ScriptedEngine) -> ChatService {
        ChatService::new(Arc::new(engine.clone()), PromptRenderer::default())
    }

    fn hello() -> ChatRequest {
        ChatRequest::new(vec![ConversationMessage::user("Hello")])
    }

    #[tokio::test]
    async fn test_complete_parses_buffered_output() {
        let engine = ScriptedEngine::new(["<think>greet</th", "ink>\n\nHi ", "there!"]);
        let gate = AdmissionGate::new();
        let completion = service(&engine)
            .complete(gate.try_acquire().unwrap(), &hello().with_thinking(true))
            .await
            .unwrap();

        assert_eq!(completion.output.content, "Hi there!");
        assert_eq!(completion.output.thinking.as_deref(), Some("greet"));
        assert_eq!(completion.fragments, 3);
        assert!(!gate.is_busy());
        assert_eq!(engine.active(), 0);
    }

    #[tokio::test]
    async fn test_prompt_sent_to_engine() {
        let engine = ScriptedEngine::new(["ok"]);
        let gate = AdmissionGate::new();
        service(&engine)
            .complete(gate.try_acquire().unwrap(), &hello())
            .await
            .unwrap();

        assert_eq!(
            engine.last_prompt().unwrap(),
            "<|im_start|>user\nHello /nothink<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[tokio::test]
    async fn test_tools_are_injected() {
        let engine = ScriptedEngine::new([
            r#"<tool_call>{"name":"lookup","arguments":{"q":"rk3588"}}</tool_call>"#,
        ]);
        let gate = AdmissionGate::new();
        let request = hello().with_tools(vec![ToolSchema::new("lookup", "Search", json!({}))]);

        let completion = service(&engine)
            .complete(gate.try_acquire().unwrap(), &request)
            .await
            .unwrap();

        let prompt = engine.last_prompt().unwrap();
        assert!(prompt.starts_with("<|im_start|>system\n# Tools"));
        assert_eq!(completion.output.tool_calls[0].name, "lookup");
        assert_eq!(completion.output.content, "");
    }

    #[tokio::test]
    async fn test_empty_conversation_is_malformed() {
        let engine = ScriptedEngine::new(["unused"]);
        let gate = AdmissionGate::new();
        let err = service(&engine)
            .complete(gate.try_acquire().unwrap(), &ChatRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::MalformedRequest(_)));
        assert_eq!(err.suggested_status_code(), 400);
        assert_eq!(engine.calls(), 0);
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_generation_failure_releases_permit() {
        let engine = ScriptedEngine::new(["a", "b", "c"]).failing_after(1);
        let gate = AdmissionGate::new();
        let err = service(&engine)
            .complete(gate.try_acquire().unwrap(), &hello())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Generation(GenerationError::Stream(_))));
        assert_eq!(err.suggested_status_code(), 500);
        assert!(!gate.is_busy());
        assert_eq!(engine.active(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_releases_permit() {
        let engine = ScriptedEngine::new(["a"]).failing_to_start();
        let gate = AdmissionGate::new();
        let err = service(&engine)
            .stream(gate.try_acquire().unwrap(), &hello())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Generation(GenerationError::StartFailed(_))));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_stream_holds_permit_until_consumed() {
        let engine = ScriptedEngine::new(["<think>", "plan", "</think>", "Done"]);
        let gate = AdmissionGate::new();
        let stream = service(&engine)
            .stream(gate.try_acquire().unwrap(), &hello().with_thinking(true))
            .await
            .unwrap();

        assert!(gate.is_busy());
        let segments: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(
            segments,
            vec![Segment::thinking("plan"), Segment::content("Done")]
        );
        assert!(!gate.is_busy());
        assert_eq!(engine.active(), 0);
    }

    #[test]
    fn test_busy_is_retryable() {
        let err = ChatError::from(BusyError {
            waited: Duration::ZERO,
        });
        assert!(err.is_retryable());
        assert_eq!(err.suggested_status_code(), 503);
    }
}
