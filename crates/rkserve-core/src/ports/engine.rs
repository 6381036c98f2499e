//! Inference engine port.
//!
//! This port abstracts the NPU runtime from the request pipeline. The
//! pipeline never interprets fragments beyond UTF-8 assembly and tag
//! classification.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

/// Lazy, finite, forward-only sequence of output fragments for one request.
///
/// Fragments are raw bytes: a multi-byte character may be split across two
/// fragments. Dropping the stream abandons the generation.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Bytes, GenerationError>> + Send>>;

/// Errors that can occur while producing or consuming a generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The engine refused the request because it is not ready.
    #[error("Engine is not ready")]
    NotReady,

    /// The engine failed before producing any output.
    #[error("Failed to start generation: {0}")]
    StartFailed(String),

    /// The fragment stream failed mid-generation.
    #[error("Generation failed: {0}")]
    Stream(String),

    /// The generation exceeded its configured wall-clock limit.
    #[error("Generation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Readiness signal of the hardware resource.
pub trait ReadinessProbe: Send + Sync {
    /// Returns true when the engine can accept a new generation.
    fn is_ready(&self) -> bool;
}

/// Port for running inference on the single loaded model.
///
/// Implementations handle:
/// - Starting a generation for a rendered prompt
/// - Streaming fragments as they are produced
/// - Aborting the generation when the stream is dropped
#[async_trait]
pub trait InferenceEngine: ReadinessProbe + fmt::Debug {
    /// Start generating a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError` if the generation cannot be started.
    async fn generate(&self, prompt: &str) -> Result<FragmentStream, GenerationError>;
}
