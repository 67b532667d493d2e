//! Embedding provider trait

use async_trait::async_trait;

use crate::Result;

/// Trait for embedding models
///
/// Implementations map text to fixed-dimension vectors. Every vector returned
/// by one provider instance has the same length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of passages, one vector per input in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Name of the embedding model, used in logs and reports
    fn model_id(&self) -> &str;
}
