//! HTTP surfaces for rkserve.
//!
//! Two protocol adapters share one router and one admission gate:
//! an OpenAI-style API under `/v1` (non-blocking admission) and an
//! Ollama-style API under `/api` (bounded-poll admission).

#![deny(unsafe_code)]

pub mod error;
pub mod models;
pub mod ollama_handlers;
pub mod ollama_models;
pub mod ollama_stream;
pub mod server;
pub mod sse;

pub use server::{ProxyState, ServedModel, create_router, serve};
