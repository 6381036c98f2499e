//! Port definitions (trait abstractions) for external systems.
//!
//! The only external collaborator of the core is the inference engine.
//! It is modeled as a readiness signal plus a generator that turns a
//! rendered prompt into a lazy stream of byte fragments.

pub mod engine;

pub use engine::{FragmentStream, GenerationError, InferenceEngine, ReadinessProbe};
