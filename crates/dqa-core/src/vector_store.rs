//! Vector store trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Source information carried by every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    /// 1-based page number, absent for page-less formats
    pub page: Option<u32>,
    /// Position of the chunk among all chunks of its source
    pub chunk_index: usize,
}

/// A contiguous span of document text used as the unit of retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk with an id derived from its source position
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        let source_hash = format!("{:x}", md5::compute(metadata.source.as_bytes()));
        let id = match metadata.page {
            Some(page) => format!("{}-p{}-c{}", &source_hash[..12], page, metadata.chunk_index),
            None => format!("{}-c{}", &source_hash[..12], metadata.chunk_index),
        };

        Self {
            id,
            content: content.into(),
            metadata,
        }
    }

    /// Human-readable location, e.g. `report.pdf, page 3`
    pub fn location(&self) -> String {
        match self.metadata.page {
            Some(page) => format!("{}, page {}", self.metadata.source, page),
            None => self.metadata.source.clone(),
        }
    }
}

/// A chunk together with the score assigned by the stage that produced it
///
/// Index searches report squared L2 distance (lower is closer); re-rankers
/// report relevance (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Trait for in-memory vector indexes
///
/// An index is built wholesale from a chunk list and is read-only afterwards.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed `query` and return the `k` nearest chunks
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Return the `k` chunks nearest to an already computed vector
    fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Number of indexed chunks
    fn len(&self) -> usize;

    /// Check whether the index holds no chunks
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the indexed vectors
    fn dimension(&self) -> usize;
}
