//! Vision runtime backed by an Ollama-compatible HTTP server.
//!
//! The server owns weights and GPU memory; this crate maps its pull,
//! show and generate endpoints onto the processor/model contract.

pub mod client;
pub mod probe;
pub mod pull;
pub mod runtime;

pub use client::{DEFAULT_BASE_URL, OllamaClient};
pub use probe::OllamaProbe;
pub use runtime::{OllamaModel, OllamaProcessor, OllamaRuntime};
