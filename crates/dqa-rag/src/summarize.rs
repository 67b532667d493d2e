//! Document summarization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use dqa_core::{Chunk, Error, GenerationConfig, LLMProvider, Result};

use crate::prompt::{PromptTemplate, refine_summary_prompt, stuff_summary_prompt};

/// How a document summary is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStrategy {
    /// One model call over a sample from the start and end of the document
    #[default]
    Stuff,
    /// An initial summary refined by one model call per remaining chunk
    Refine,
}

impl fmt::Display for SummaryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStrategy::Stuff => f.write_str("stuff"),
            SummaryStrategy::Refine => f.write_str("refine"),
        }
    }
}

impl FromStr for SummaryStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stuff" | "fast" => Ok(SummaryStrategy::Stuff),
            "refine" | "full" => Ok(SummaryStrategy::Refine),
            other => Err(Error::InvalidInput(format!(
                "unknown summary strategy '{}', expected 'stuff' or 'refine'",
                other
            ))),
        }
    }
}

/// Summarizes processed chunks with the chat model
pub struct Summarizer {
    llm: Arc<dyn LLMProvider>,
    sample: usize,
    generation: GenerationConfig,
    stuff_prompt: PromptTemplate,
    refine_prompt: PromptTemplate,
}

impl Summarizer {
    /// `sample` is the number of chunks taken from each end for a stuff summary
    pub fn new(llm: Arc<dyn LLMProvider>, sample: usize) -> Result<Self> {
        if sample == 0 {
            return Err(Error::Configuration(
                "summary sample must be at least one chunk".to_string(),
            ));
        }

        let generation = llm.default_config();

        Ok(Self {
            llm,
            sample,
            generation,
            stuff_prompt: stuff_summary_prompt()?,
            refine_prompt: refine_summary_prompt()?,
        })
    }

    pub async fn summarize(&self, chunks: &[Chunk], strategy: SummaryStrategy) -> Result<String> {
        if chunks.is_empty() {
            return Err(Error::NoDocuments("there is nothing to summarize".to_string()));
        }

        info!(strategy = %strategy, chunks = chunks.len(), "summarizing documents");
        match strategy {
            SummaryStrategy::Stuff => self.stuff(chunks).await,
            SummaryStrategy::Refine => self.refine(chunks).await,
        }
    }

    /// Chunks used by a stuff summary: the first and last `sample`, or all of
    /// them when the two ends would overlap
    pub fn sample_chunks<'a>(&self, chunks: &'a [Chunk]) -> Vec<&'a Chunk> {
        if chunks.len() <= self.sample * 2 {
            return chunks.iter().collect();
        }

        chunks[..self.sample]
            .iter()
            .chain(chunks[chunks.len() - self.sample..].iter())
            .collect()
    }

    async fn stuff(&self, chunks: &[Chunk]) -> Result<String> {
        let text = self
            .sample_chunks(chunks)
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.stuff_prompt.format(&[("text", text.as_str())])?;
        self.generate(&prompt).await
    }

    async fn refine(&self, chunks: &[Chunk]) -> Result<String> {
        let (first, rest) = chunks
            .split_first()
            .ok_or_else(|| Error::NoDocuments("there is nothing to summarize".to_string()))?;

        let prompt = self.stuff_prompt.format(&[("text", first.content.as_str())])?;
        let mut summary = self.generate(&prompt).await?;

        for (i, chunk) in rest.iter().enumerate() {
            let prompt = self.refine_prompt.format(&[
                ("existing_summary", summary.as_str()),
                ("text", chunk.content.as_str()),
            ])?;
            summary = self.generate(&prompt).await?;
            info!(step = i + 1, of = rest.len(), "refined summary");
        }

        Ok(summary)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let result = self.llm.generate_with_config(prompt, &self.generation).await?;
        Ok(result.text.trim().to_string())
    }
}
