//! Recursive character text splitter

use std::collections::VecDeque;
use tracing::warn;

use dqa_core::{Chunk, ChunkMetadata, Document, Error, Result};

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text into overlapping windows, preferring paragraph, then line,
/// then word boundaries, and falling back to single characters.
///
/// Lengths are measured in characters. Separators stay attached to the start
/// of the piece that follows them, and every emitted chunk is trimmed.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterTextSplitter {
    pub const DEFAULT_SEPARATORS: [&'static str; 4] = ["\n\n", "\n", " ", ""];

    /// Create a splitter with the default separators
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be greater than zero".to_string()));
        }
        if chunk_overlap > chunk_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({}) is larger than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: Self::DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator hierarchy, most preferred first
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into chunk strings
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split page documents into chunks, numbering chunks per source
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current_source: Option<&str> = None;
        let mut chunk_index = 0;

        for document in documents {
            if current_source != Some(document.metadata.source.as_str()) {
                current_source = Some(document.metadata.source.as_str());
                chunk_index = 0;
            }

            for text in self.split_text(&document.page_content) {
                chunks.push(Chunk::new(
                    text,
                    ChunkMetadata {
                        source: document.metadata.source.clone(),
                        page: document.metadata.page,
                        chunk_index,
                    },
                ));
                chunk_index += 1;
            }
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // first separator present in the text wins; "" always matches
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = String::new();
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.clone();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut fitting: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, &separator) {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                final_chunks.extend(self.merge_splits(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                final_chunks.push(piece);
            } else {
                final_chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !fitting.is_empty() {
            final_chunks.extend(self.merge_splits(&fitting));
        }

        final_chunks
    }

    /// Greedily pack pieces into windows, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next window
    fn merge_splits(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    warn!(
                        size = total,
                        limit = self.chunk_size,
                        "created a chunk longer than the configured size"
                    );
                }

                if let Some(chunk) = join_trimmed(&window) {
                    chunks.push(chunk);
                }

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    text.split(separator)
        .enumerate()
        .map(|(i, part)| {
            if i == 0 {
                part.to_string()
            } else {
                format!("{}{}", separator, part)
            }
        })
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
