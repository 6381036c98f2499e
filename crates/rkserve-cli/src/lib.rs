//! Command-line entry point for rkserve.
//!
//! `main.rs` parses arguments, initializes logging and hands the composed
//! server state from [`bootstrap`] to `rkserve_proxy::serve`.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod error;
pub mod parser;

pub use bootstrap::{ServerContext, bootstrap};
pub use error::CliError;
pub use parser::Cli;
