//! Retrievers over the vector index

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use dqa_core::{Result, RetrievedChunk, Retriever, VectorStore};

use crate::reranker::CrossEncoderReranker;

/// Returns the `k` nearest chunks from a vector store
#[derive(Clone)]
pub struct VectorStoreRetriever {
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl VectorStoreRetriever {
    pub fn new(store: Arc<dyn VectorStore>, k: usize) -> Self {
        Self { store, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[async_trait]
impl Retriever for VectorStoreRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let results = self.store.similarity_search(query, self.k).await?;
        debug!(k = self.k, found = results.len(), "similarity search");
        Ok(results)
    }
}

/// Fetches candidates from a base retriever, then re-ranks and trims them
#[derive(Clone)]
pub struct ContextualCompressionRetriever {
    base: Arc<dyn Retriever>,
    reranker: CrossEncoderReranker,
}

impl ContextualCompressionRetriever {
    pub fn new(base: Arc<dyn Retriever>, reranker: CrossEncoderReranker) -> Self {
        Self { base, reranker }
    }
}

#[async_trait]
impl Retriever for ContextualCompressionRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let candidates = self.base.retrieve(query).await?;
        self.reranker.compress(query, candidates).await
    }
}
