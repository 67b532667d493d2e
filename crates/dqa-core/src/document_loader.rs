//! Document loader trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// An uploaded file: a display name plus its raw bytes
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, naming it after its file name
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self { name, bytes })
    }

    /// Lower-cased file extension, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

/// Where a piece of extracted text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// 1-based page number, absent for page-less formats
    pub page: Option<u32>,
}

/// Extracted text of one page (or of a whole page-less file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

/// Trait for document loaders
///
/// A loader turns the bytes of one uploaded file into per-page documents.
/// Unreadable or corrupt input is an error for the whole request.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Extract the documents contained in `file`
    async fn load(&self, file: &SourceFile) -> Result<Vec<Document>>;
}
