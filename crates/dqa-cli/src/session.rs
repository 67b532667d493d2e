//! Chat session state

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use dqa_core::{
    ChatMessage, Chunk, EmbeddingProvider, Error, LLMProvider, Result, Retriever, Role,
    SourceCitation, SourceFile, StyleOptions,
};
use dqa_rag::{
    ContextualCompressionRetriever, ConversationBufferMemory, ConversationalQaChain,
    CrossEncoderReranker, DocumentIndexer, FlatIndex, QaResponse, RecursiveCharacterTextSplitter,
    RetrievalConfig, Summarizer, SummaryStrategy, VectorStoreRetriever,
};

/// What a successful document processing produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingReport {
    pub files: usize,
    pub pages: usize,
    pub chunks: usize,
    pub sources: Vec<String>,
}

/// Index-backed state of the most recent successful processing
struct ProcessedDocuments {
    chunks: Vec<Chunk>,
    chain: ConversationalQaChain,
}

/// One user's conversation with their processed documents
pub struct Session {
    id: Uuid,
    llm: Arc<dyn LLMProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<CrossEncoderReranker>,
    indexer: DocumentIndexer,
    summarizer: Summarizer,
    retrieval: RetrievalConfig,
    processed: Option<ProcessedDocuments>,
    memory: ConversationBufferMemory,
    transcript: Vec<ChatMessage>,
    style: StyleOptions,
}

impl Session {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalConfig,
    ) -> Result<Self> {
        let splitter = RecursiveCharacterTextSplitter::new(retrieval.chunk_size, retrieval.chunk_overlap)?;
        let summarizer = Summarizer::new(llm.clone(), retrieval.summary_sample)?;

        Ok(Self {
            id: Uuid::new_v4(),
            llm,
            embedder,
            reranker: None,
            indexer: DocumentIndexer::new(splitter),
            summarizer,
            retrieval,
            processed: None,
            memory: ConversationBufferMemory::new(),
            transcript: Vec::new(),
            style: StyleOptions::default(),
        })
    }

    /// Re-rank retrieved chunks before answering
    pub fn with_reranker(mut self, reranker: CrossEncoderReranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_style(mut self, style: StyleOptions) -> Self {
        self.style = style;
        self
    }

    /// Model that answers questions, also used to grade evaluations
    pub fn llm(&self) -> &Arc<dyn LLMProvider> {
        &self.llm
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ingest `files` and rebuild the index and QA chain from scratch
    ///
    /// The previous index is dropped first, so a failed run leaves the
    /// session not ready until processing succeeds again.
    pub async fn process_documents(&mut self, files: &[SourceFile]) -> Result<ProcessingReport> {
        self.processed = None;

        if files.is_empty() {
            return Err(Error::NoDocuments("upload at least one document first".to_string()));
        }

        let ingested = self.indexer.process(files).await?;
        if ingested.chunks.is_empty() {
            return Err(Error::NoDocuments(
                "no text could be extracted from the uploaded documents".to_string(),
            ));
        }

        let report = ProcessingReport {
            files: ingested.files,
            pages: ingested.pages,
            chunks: ingested.chunks.len(),
            sources: files.iter().map(|f| f.name.clone()).collect(),
        };

        let index = FlatIndex::build(ingested.chunks.clone(), self.embedder.clone()).await?;
        let base: Arc<dyn Retriever> = Arc::new(VectorStoreRetriever::new(Arc::new(index), self.retrieval.k));

        let retriever: Arc<dyn Retriever> = match &self.reranker {
            Some(reranker) => Arc::new(ContextualCompressionRetriever::new(base, reranker.clone())),
            None => {
                warn!("re-ranking disabled, answering from raw similarity results");
                base
            }
        };

        let chain = ConversationalQaChain::new(self.llm.clone(), retriever)?.with_style(self.style.clone());

        self.processed = Some(ProcessedDocuments {
            chunks: ingested.chunks,
            chain,
        });

        info!(
            session = %self.id,
            files = report.files,
            pages = report.pages,
            chunks = report.chunks,
            "documents processed"
        );
        Ok(report)
    }

    /// Read `paths` from disk and process them as one document set
    ///
    /// An unreadable path fails the whole set and clears the previous index.
    pub async fn process_paths(&mut self, paths: &[PathBuf]) -> Result<ProcessingReport> {
        self.processed = None;

        let files = paths
            .iter()
            .map(|path| {
                SourceFile::from_path(path).map_err(|e| {
                    Error::DocumentLoader(format!("cannot read {}: {}", path.display(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.process_documents(&files).await
    }

    pub fn is_ready(&self) -> bool {
        self.processed.is_some()
    }

    /// Ask a question about the processed documents
    pub async fn ask(&mut self, question: &str) -> Result<QaResponse> {
        let processed = self.processed.as_ref().ok_or_else(not_ready)?;

        let response = processed.chain.invoke(question, &mut self.memory).await?;
        self.record(&response);
        Ok(response)
    }

    /// Ask a question, passing answer fragments to `on_token` as they arrive
    pub async fn ask_stream<F>(&mut self, question: &str, on_token: F) -> Result<QaResponse>
    where
        F: FnMut(&str) + Send,
    {
        let processed = self.processed.as_ref().ok_or_else(not_ready)?;

        let response = processed
            .chain
            .invoke_stream(question, &mut self.memory, on_token)
            .await?;
        self.record(&response);
        Ok(response)
    }

    /// Summarize everything that was processed
    pub async fn summarize(&self, strategy: SummaryStrategy) -> Result<String> {
        let processed = self.processed.as_ref().ok_or_else(not_ready)?;
        self.summarizer.summarize(&processed.chunks, strategy).await
    }

    pub fn set_style(&mut self, style: StyleOptions) {
        if let Some(processed) = self.processed.as_mut() {
            processed.chain.set_style(style.clone());
        }
        self.style = style;
    }

    pub fn style(&self) -> &StyleOptions {
        &self.style
    }

    /// Forget the conversation, keeping the processed documents
    pub fn reset(&mut self) {
        self.memory.clear();
        self.transcript.clear();
    }

    pub fn memory(&self) -> &ConversationBufferMemory {
        &self.memory
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn chunks(&self) -> &[Chunk] {
        self.processed.as_ref().map(|p| p.chunks.as_slice()).unwrap_or(&[])
    }

    /// Citations attached to the latest answer
    pub fn last_sources(&self) -> Option<&[SourceCitation]> {
        self.transcript
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.sources.as_slice())
    }

    fn record(&mut self, response: &QaResponse) {
        self.transcript.push(ChatMessage::human(response.question.clone()));
        self.transcript
            .push(ChatMessage::assistant(response.answer.clone(), response.citations()));
    }
}

fn not_ready() -> Error {
    Error::NotReady("process your documents before asking questions".to_string())
}
