//! LLM provider trait and types

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Configuration for text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model_id: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: "mistral".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            stop_sequences: Vec::new(),
        }
    }
}

/// Result of a text generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub model_id: String,
    pub tokens_used: Option<u32>,
}

/// Incremental text fragments produced by a streaming generation.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Trait for chat-oriented language models (e.g. Ollama, hosted endpoints)
///
/// The prompt is a fully rendered template; providers are expected to send it
/// as a single user turn and return the assistant's reply.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate text using the provider's default configuration
    async fn generate(&self, prompt: &str) -> Result<GenerationResult>;

    /// Generate text with custom configuration
    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult>;

    /// Generate text token by token
    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TokenStream>;

    /// Get the model ID being used
    fn model_id(&self) -> &str;

    /// Default generation settings for this provider
    fn default_config(&self) -> GenerationConfig {
        GenerationConfig {
            model_id: self.model_id().to_string(),
            ..Default::default()
        }
    }
}
