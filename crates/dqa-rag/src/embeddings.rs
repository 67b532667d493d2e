//! Offline embedding provider

use async_trait::async_trait;

use dqa_core::{EmbeddingProvider, Error, Result};

/// Deterministic bag-of-words embeddings built by feature hashing
///
/// Each lower-cased word adds weight to three hashed dimensions and each
/// bigram to one more; the vector is L2-normalized. Texts sharing vocabulary
/// land close together, which is enough for offline use and for tests.
#[derive(Debug, Clone)]
pub struct HashingEmbeddings {
    dimension: usize,
}

impl HashingEmbeddings {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Configuration("embedding dimension must be positive".to_string()));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, digest: &[u8], offset: usize) -> usize {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&digest[offset..offset + 4]);
        u32::from_le_bytes(raw) as usize % self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut embedding = vec![0.0f32; self.dimension];

        for word in &words {
            let digest = md5::compute(word.as_bytes());
            embedding[self.bucket(&digest.0, 0)] += 1.0;
            embedding[self.bucket(&digest.0, 4)] += 0.7;
            embedding[self.bucket(&digest.0, 8)] += 0.5;
        }

        for pair in words.windows(2) {
            let digest = md5::compute(format!("{} {}", pair[0], pair[1]).as_bytes());
            embedding[self.bucket(&digest.0, 12)] += 0.8;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in embedding.iter_mut() {
                *value /= magnitude;
            }
        }

        embedding
    }
}

impl Default for HashingEmbeddings {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn model_id(&self) -> &str {
        "hashing"
    }
}
