//! Cross-encoder re-ranking

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use dqa_core::{CrossEncoder, Error, Result, RetrievedChunk};

use crate::config::RerankerConfig;

/// Re-scores retrieved chunks with a cross-encoder and keeps the best `top_n`
#[derive(Clone)]
pub struct CrossEncoderReranker {
    model: Arc<dyn CrossEncoder>,
    top_n: usize,
}

impl CrossEncoderReranker {
    pub fn new(model: Arc<dyn CrossEncoder>, top_n: usize) -> Self {
        Self { model, top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Reorder `chunks` by descending relevance to `query` and truncate
    ///
    /// Each returned chunk carries its relevance score. Equal scores keep
    /// the incoming order.
    pub async fn compress(&self, query: &str, chunks: Vec<RetrievedChunk>) -> Result<Vec<RetrievedChunk>> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let passages: Vec<String> = chunks.iter().map(|c| c.chunk.content.clone()).collect();
        let scores = self.model.score(query, &passages).await?;

        if scores.len() != chunks.len() {
            return Err(Error::Reranker(format!(
                "cross-encoder '{}' returned {} scores for {} passages",
                self.model.model_id(),
                scores.len(),
                chunks.len()
            )));
        }

        let mut ranked: Vec<RetrievedChunk> = chunks
            .into_iter()
            .zip(scores)
            .map(|(mut retrieved, score)| {
                retrieved.score = score;
                retrieved
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(self.top_n);

        debug!(kept = ranked.len(), model = self.model.model_id(), "re-ranked chunks");
        Ok(ranked)
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

/// Cross-encoder served over HTTP by a text-embeddings-inference `/rerank` endpoint
pub struct TeiCrossEncoder {
    config: RerankerConfig,
    client: Client,
}

impl TeiCrossEncoder {
    pub fn new(config: RerankerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(RerankerConfig::from_env()?)
    }
}

/// Put `/rerank` results back into passage order
fn scores_in_input_order(results: Vec<RerankScore>, expected: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; expected];

    for result in results {
        let slot = scores.get_mut(result.index).ok_or_else(|| {
            Error::Reranker(format!(
                "re-ranker returned index {} for {} passages",
                result.index, expected
            ))
        })?;
        *slot = Some(result.score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, score)| {
            score.ok_or_else(|| Error::Reranker(format!("re-ranker returned no score for passage {}", i)))
        })
        .collect()
}

#[async_trait]
impl CrossEncoder for TeiCrossEncoder {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.config.url);
        let request = RerankRequest {
            query,
            texts: passages,
            raw_scores: false,
            truncate: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Reranker(format!("re-ranker unavailable at {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Reranker(format!(
                "re-rank request failed with status {}: {}",
                status, error_text
            )));
        }

        let results: Vec<RerankScore> = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        scores_in_input_order(results, passages.len())
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
