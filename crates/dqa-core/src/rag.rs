//! Retrieval traits

use async_trait::async_trait;

use crate::{Result, RetrievedChunk};

/// Trait for anything that turns a query into ranked chunks
///
/// Implemented by plain index retrievers as well as by re-ranking wrappers.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks relevant to `query`, best first
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>>;
}

/// Trait for cross-encoder relevance models
///
/// A cross-encoder reads the query and each passage together and returns one
/// relevance score per passage, in the order the passages were given.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score each passage against the query
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;

    /// Name of the scoring model
    fn model_id(&self) -> &str;
}
