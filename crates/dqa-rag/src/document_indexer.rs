//! Ingestion: uploaded files to chunks

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use dqa_core::{Chunk, DocumentLoader, Error, Result, SourceFile};

use crate::loader::FileLoader;
use crate::splitter::RecursiveCharacterTextSplitter;

/// Outcome of turning a batch of uploads into chunks
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub files: usize,
    pub pages: usize,
    pub chunks: Vec<Chunk>,
}

/// Loads every uploaded file and splits its pages into chunks
pub struct DocumentIndexer {
    loader: Arc<dyn DocumentLoader>,
    splitter: RecursiveCharacterTextSplitter,
}

impl DocumentIndexer {
    /// Create an indexer using the extension-dispatching file loader
    pub fn new(splitter: RecursiveCharacterTextSplitter) -> Self {
        Self {
            loader: Arc::new(FileLoader),
            splitter,
        }
    }

    /// Load and split all files, in upload order
    ///
    /// The first file that cannot be read aborts the whole batch.
    pub async fn process(&self, files: &[SourceFile]) -> Result<IngestionResult> {
        if files.is_empty() {
            return Err(Error::NoDocuments("no files were provided".to_string()));
        }

        let mut pages = 0;
        let mut chunks = Vec::new();

        for file in files {
            let documents = self.loader.load(file).await?;
            let file_chunks = self.splitter.split_documents(&documents);

            info!(
                file = %file.name,
                pages = documents.len(),
                chunks = file_chunks.len(),
                "split document"
            );

            pages += documents.len();
            chunks.extend(file_chunks);
        }

        Ok(IngestionResult {
            files: files.len(),
            pages,
            chunks,
        })
    }
}
