//! Ollama configuration

use serde::{Deserialize, Serialize};
use std::env;
use dqa_core::settings::parse_var;
use dqa_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_CHAT_MODEL: &str = "mistral";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Configuration for the Ollama client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub embed_batch_size: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.2,
            request_timeout_secs: 300,
            embed_batch_size: 32,
        }
    }
}

impl OllamaConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("OLLAMA_BASE_URL")
            .or_else(|| lookup("OLLAMA_HOST"))
            .unwrap_or(defaults.base_url);
        let base_url = normalize_base_url(&base_url)?;

        let chat_model = lookup("OLLAMA_CHAT_MODEL").unwrap_or(defaults.chat_model);
        let embedding_model = lookup("OLLAMA_EMBED_MODEL").unwrap_or(defaults.embedding_model);

        let temperature = parse_var(&lookup, "OLLAMA_TEMPERATURE", defaults.temperature)?;
        let request_timeout_secs =
            parse_var(&lookup, "OLLAMA_TIMEOUT_SECS", defaults.request_timeout_secs)?;
        let embed_batch_size =
            parse_var(&lookup, "OLLAMA_EMBED_BATCH_SIZE", defaults.embed_batch_size)?;

        if embed_batch_size == 0 {
            return Err(Error::Configuration(
                "OLLAMA_EMBED_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            chat_model,
            embedding_model,
            temperature,
            request_timeout_secs,
            embed_batch_size,
        })
    }

    /// Create configuration with explicit models
    pub fn new(chat_model: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            ..Default::default()
        }
    }

    /// Full url of an API endpoint, e.g. `endpoint("api/chat")`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let parsed = url::Url::parse(&candidate)
        .map_err(|e| Error::Configuration(format!("invalid Ollama url '{}': {}", raw, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::Configuration(format!(
            "Ollama url must use http or https, got '{}'",
            parsed.scheme()
        )));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}
