//! Ollama integration for docqa
//!
//! This crate provides the Ollama implementation of the LLMProvider and
//! EmbeddingProvider traits, talking to a local or remote Ollama server.

mod client;
mod config;

#[cfg(test)]
mod tests;

pub use client::{ModelAvailability, OllamaClient};
pub use config::OllamaConfig;

// Re-export core types for convenience
pub use dqa_core::{
    EmbeddingProvider, GenerationConfig, GenerationResult, LLMProvider, TokenStream,
    Error, Result,
};
