//! Common types used across the docqa system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, RetrievedChunk};

/// Who produced a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// A passage cited in support of an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub source: String,
    pub page: Option<u32>,
    pub excerpt: String,
}

impl From<&RetrievedChunk> for SourceCitation {
    fn from(retrieved: &RetrievedChunk) -> Self {
        Self {
            source: retrieved.chunk.metadata.source.clone(),
            page: retrieved.chunk.metadata.page,
            excerpt: retrieved.chunk.content.clone(),
        }
    }
}

/// One entry of the displayed conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub sources: Vec<SourceCitation>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            sources: Vec::new(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceCitation>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Tone requested for generated answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Professional,
    Friendly,
    Concise,
    Detailed,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tone::Neutral => "neutral",
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
            Tone::Concise => "concise",
            Tone::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

impl FromStr for Tone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Ok(Tone::Neutral),
            "professional" | "formal" => Ok(Tone::Professional),
            "friendly" | "casual" => Ok(Tone::Friendly),
            "concise" | "brief" => Ok(Tone::Concise),
            "detailed" => Ok(Tone::Detailed),
            other => Err(Error::InvalidInput(format!(
                "unknown tone '{}', expected one of: neutral, professional, friendly, concise, detailed",
                other
            ))),
        }
    }
}

/// Style controls substituted into the answer prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleOptions {
    pub tone: Tone,
    pub language: String,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            tone: Tone::Neutral,
            language: "English".to_string(),
        }
    }
}
