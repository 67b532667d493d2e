//! Core traits and types for docqa
//!
//! This crate defines the fundamental traits and types used across the docqa system.
//! It provides capability-facing interfaces for language models, embedding models,
//! vector stores, retrievers, cross-encoders and document loaders, so each stage of
//! the question-answering pipeline can be swapped or mocked independently.

pub mod llm;
pub mod embedding;
pub mod vector_store;
pub mod rag;
pub mod document_loader;
pub mod error;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
pub use llm::{LLMProvider, GenerationConfig, GenerationResult, TokenStream};
pub use embedding::EmbeddingProvider;
pub use vector_store::{VectorStore, Chunk, ChunkMetadata, RetrievedChunk};
pub use rag::{Retriever, CrossEncoder};
pub use document_loader::{DocumentLoader, Document, DocumentMetadata, SourceFile};
pub use types::*;
