//! Process-backed inference engine for rkserve.
//!
//! Implements the core `InferenceEngine` port by running the vendor NPU
//! runtime wrapper once per generation.

#![deny(unsafe_code)]

pub mod config;
pub mod engine;

pub use config::{DEFAULT_RUNTIME_BIN, EngineConfigError, ProcessEngineConfig, TargetPlatform};
pub use engine::ProcessEngine;
