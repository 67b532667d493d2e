//! Document loaders

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info};

use dqa_core::{Document, DocumentLoader, DocumentMetadata, Error, Result, SourceFile};

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}\u{000C}]+").expect("valid regex"));
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Collapse layout whitespace left behind by text extraction
///
/// Runs of spaces and tabs become one space, spaces around line breaks are
/// dropped and three or more newlines become a single paragraph break.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Loads PDF files, one document per page
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, file: &SourceFile) -> Result<Vec<Document>> {
        let bytes = file.bytes.clone();
        let name = file.name.clone();

        // pdf-extract is CPU bound and may panic on malformed input
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| Error::DocumentLoader(format!("PDF extraction of '{}' aborted: {}", name, e)))?
        .map_err(|e| Error::DocumentLoader(format!("failed to read PDF '{}': {}", file.name, e)))?;

        let documents: Vec<Document> = pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document {
                page_content: normalize_text(&text),
                metadata: DocumentMetadata {
                    source: file.name.clone(),
                    page: Some(i as u32 + 1),
                },
            })
            .collect();

        info!(file = %file.name, pages = documents.len(), "loaded PDF");
        Ok(documents)
    }
}

/// Loads plain text and markdown files as a single document
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, file: &SourceFile) -> Result<Vec<Document>> {
        let text = std::str::from_utf8(&file.bytes).map_err(|e| {
            Error::DocumentLoader(format!("'{}' is not valid UTF-8: {}", file.name, e))
        })?;

        debug!(file = %file.name, bytes = file.bytes.len(), "loaded text file");
        Ok(vec![Document {
            page_content: normalize_text(text),
            metadata: DocumentMetadata {
                source: file.name.clone(),
                page: None,
            },
        }])
    }
}

/// Loads HTML files, keeping the text of headings, paragraphs, lists and tables
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLoader;

impl HtmlLoader {
    const BLOCKS: &'static str = "title, h1, h2, h3, h4, h5, h6, p, li, td, th, pre, blockquote";

    fn extract_text(html: &str) -> Result<String> {
        let document = Html::parse_document(html);
        let blocks = Selector::parse(Self::BLOCKS)
            .map_err(|e| Error::DocumentLoader(format!("invalid selector: {:?}", e)))?;

        let mut parts = Vec::new();
        for element in document.select(&blocks) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }

        if parts.is_empty() {
            // no block structure, fall back to all body text
            let body = Selector::parse("body")
                .map_err(|e| Error::DocumentLoader(format!("invalid selector: {:?}", e)))?;
            for element in document.select(&body) {
                parts.push(element.text().collect::<Vec<_>>().join(" "));
            }
        }

        Ok(parts.join("\n\n"))
    }
}

#[async_trait]
impl DocumentLoader for HtmlLoader {
    async fn load(&self, file: &SourceFile) -> Result<Vec<Document>> {
        let html = String::from_utf8_lossy(&file.bytes);
        let text = Self::extract_text(&html)?;

        Ok(vec![Document {
            page_content: normalize_text(&text),
            metadata: DocumentMetadata {
                source: file.name.clone(),
                page: None,
            },
        }])
    }
}

/// Picks a loader from the file extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    pub const SUPPORTED_EXTENSIONS: &'static [&'static str] = &["pdf", "txt", "md", "markdown", "html", "htm"];

    pub fn is_supported(file: &SourceFile) -> bool {
        file.extension()
            .is_some_and(|ext| Self::SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self, file: &SourceFile) -> Result<Vec<Document>> {
        match file.extension().as_deref() {
            Some("pdf") => PdfLoader.load(file).await,
            Some("txt") | Some("md") | Some("markdown") => TextLoader.load(file).await,
            Some("html") | Some("htm") => HtmlLoader.load(file).await,
            Some(other) => Err(Error::DocumentLoader(format!(
                "unsupported file type '.{}' for '{}' (supported: {})",
                other,
                file.name,
                Self::SUPPORTED_EXTENSIONS.join(", ")
            ))),
            None => Err(Error::DocumentLoader(format!(
                "cannot determine the file type of '{}'",
                file.name
            ))),
        }
    }
}
