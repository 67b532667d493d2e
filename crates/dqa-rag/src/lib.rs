//! Retrieval-augmented question answering for docqa
//!
//! This crate provides the pipeline stages: document loaders and the recursive
//! text splitter (ingestion), the flat vector index (indexing), retrievers and
//! cross-encoder re-ranking (retrieval), and conversation memory, prompt
//! templates, the conversational QA chain and summarization (generation).

mod config;
mod loader;
mod splitter;
mod document_indexer;
mod embeddings;
mod vector_store;
mod reranker;
mod retriever;
mod memory;
mod prompt;
mod chain;
mod summarize;

#[cfg(test)]
mod tests;

pub use config::{EmbeddingBackend, RerankerConfig, RetrievalConfig};
pub use loader::{FileLoader, HtmlLoader, PdfLoader, TextLoader, normalize_text};
pub use splitter::RecursiveCharacterTextSplitter;
pub use document_indexer::{DocumentIndexer, IngestionResult};
pub use embeddings::HashingEmbeddings;
pub use vector_store::FlatIndex;
pub use reranker::{CrossEncoderReranker, TeiCrossEncoder};
pub use retriever::{ContextualCompressionRetriever, VectorStoreRetriever};
pub use memory::{ConversationBufferMemory, ConversationTurn};
pub use prompt::{PromptTemplate, REFUSAL_SENTENCE, statement_support_prompt};
pub use chain::{ConversationalQaChain, QaResponse};
pub use summarize::{Summarizer, SummaryStrategy};

// Re-export core types for convenience
pub use dqa_core::{
    Chunk, ChunkMetadata, CrossEncoder, Document, DocumentLoader, DocumentMetadata,
    EmbeddingProvider, LLMProvider, RetrievedChunk, Retriever, SourceFile, StyleOptions,
    VectorStore, Error, Result,
};
