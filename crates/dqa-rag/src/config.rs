//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use dqa_core::settings::{parse_flag, parse_var};
use dqa_core::{Error, Result};

/// Which embedding model backs the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Embeddings served by the Ollama endpoint
    Ollama,
    /// Offline feature hashing, no model server required
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(EmbeddingBackend::Ollama),
            "hashing" | "offline" => Ok(EmbeddingBackend::Hashing),
            other => Err(Error::Configuration(format!(
                "unknown embedding backend '{}', expected 'ollama' or 'hashing'",
                other
            ))),
        }
    }
}

/// Chunking, retrieval and summarization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Number of chunks fetched from the index per question
    pub k: usize,
    /// Chunks taken from each end of the document for a "stuff" summary
    pub summary_sample: usize,
    pub embedding_backend: EmbeddingBackend,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            k: 10,
            summary_sample: 3,
            embedding_backend: EmbeddingBackend::Ollama,
        }
    }
}

impl RetrievalConfig {
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

        let config = Self {
            chunk_size: parse_var(&lookup, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var(&lookup, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
            k: parse_var(&lookup, "RETRIEVAL_K", defaults.k)?,
            summary_sample: parse_var(&lookup, "SUMMARY_SAMPLE", defaults.summary_sample)?,
            embedding_backend: parse_var(
                &lookup,
                "EMBEDDING_BACKEND",
                defaults.embedding_backend,
            )?,
        };

        if config.k == 0 {
            return Err(Error::Configuration("RETRIEVAL_K must be at least 1".to_string()));
        }
        if config.summary_sample == 0 {
            return Err(Error::Configuration("SUMMARY_SAMPLE must be at least 1".to_string()));
        }
        if config.chunk_overlap > config.chunk_size {
            return Err(Error::Configuration(format!(
                "CHUNK_OVERLAP ({}) is larger than CHUNK_SIZE ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(config)
    }
}

/// Settings for the cross-encoder re-ranking stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub url: String,
    pub model: String,
    /// Chunks kept after re-ranking
    pub top_n: usize,
    pub request_timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8080".to_string(),
            model: "BAAI/bge-reranker-base".to_string(),
            top_n: 3,
            request_timeout_secs: 60,
        }
    }
}

impl RerankerConfig {
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

        let url = lookup("RERANKER_URL").unwrap_or(defaults.url);
        url::Url::parse(&url)
            .map_err(|e| Error::Configuration(format!("invalid RERANKER_URL '{}': {}", url, e)))?;

        let config = Self {
            enabled: parse_flag(&lookup, "RERANKER_ENABLED", defaults.enabled)?,
            url: url.trim_end_matches('/').to_string(),
            model: lookup("RERANKER_MODEL").unwrap_or(defaults.model),
            top_n: parse_var(&lookup, "RERANKER_TOP_N", defaults.top_n)?,
            request_timeout_secs: parse_var(
                &lookup,
                "RERANKER_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
        };

        if config.top_n == 0 {
            return Err(Error::Configuration("RERANKER_TOP_N must be at least 1".to_string()));
        }

        Ok(config)
    }
}
