//! llm-core: client library for a local Ollama server
//!
//! Provides:
//! - Connection settings (`[ollama]` config section)
//! - Ollama API client (availability probe, model listing, non-streaming generate)

pub mod config;
pub mod ollama;

pub use config::OllamaConfig;
pub use ollama::{GenerateOptions, Model, OllamaClient, OllamaStatus};
