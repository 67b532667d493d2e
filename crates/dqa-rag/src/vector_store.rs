//! Exact in-memory vector index

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

use dqa_core::{Chunk, EmbeddingProvider, Error, Result, RetrievedChunk, VectorStore};

struct IndexEntry {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// Flat (brute-force) index over chunk embeddings using squared L2 distance
///
/// The index is built once from a full chunk list and never mutated; a new
/// document batch means building a new index. Results are ordered by
/// ascending distance, ties keep insertion order.
pub struct FlatIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl FlatIndex {
    /// Embed every chunk and build the index
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::NoDocuments(
                "cannot build an index from zero chunks; the documents contain no extractable text"
                    .to_string(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(Error::VectorStore(format!(
                "embedding model returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(Error::VectorStore("embedding model returned empty vectors".to_string()));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(Error::VectorStore(format!(
                "inconsistent embedding dimension: chunk {} has {} values, expected {}",
                bad,
                vectors[bad].len(),
                dimension
            )));
        }

        let entries: Vec<IndexEntry> = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexEntry { vector, chunk })
            .collect();

        info!(
            chunks = entries.len(),
            dimension,
            model = embedder.model_id(),
            "built vector index"
        );

        Ok(Self {
            embedder,
            entries,
            dimension,
        })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl VectorStore for FlatIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed_query(query).await?;
        self.search_by_vector(&vector, k)
    }

    fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if vector.len() != self.dimension {
            return Err(Error::VectorStore(format!(
                "query vector has {} dimensions, index has {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (squared_l2(vector, &entry.vector), entry))
            .collect();

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: distance,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
