//! Conversational question answering over retrieved chunks

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use dqa_core::{
    Error, GenerationConfig, LLMProvider, Result, RetrievedChunk, Retriever, SourceCitation,
    StyleOptions,
};

use crate::memory::ConversationBufferMemory;
use crate::prompt::{
    PromptTemplate, REFUSAL_SENTENCE, condense_question_prompt, qa_prompt, styled_qa_prompt,
    tone_instruction,
};

/// Outcome of one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    pub question: String,
    /// Standalone form of the question used for retrieval
    pub generated_question: String,
    pub answer: String,
    pub source_documents: Vec<RetrievedChunk>,
}

impl QaResponse {
    pub fn citations(&self) -> Vec<SourceCitation> {
        self.source_documents.iter().map(SourceCitation::from).collect()
    }

    /// Whether the answer is the fixed refusal sentence
    pub fn is_refusal(&self) -> bool {
        self.answer.trim() == REFUSAL_SENTENCE
    }
}

/// Answers questions from retrieved context, keeping the conversation in
/// a caller-owned memory buffer
pub struct ConversationalQaChain {
    llm: Arc<dyn LLMProvider>,
    retriever: Arc<dyn Retriever>,
    qa_prompt: PromptTemplate,
    styled_prompt: PromptTemplate,
    condense_prompt: PromptTemplate,
    style: StyleOptions,
    generation: GenerationConfig,
}

impl ConversationalQaChain {
    pub fn new(llm: Arc<dyn LLMProvider>, retriever: Arc<dyn Retriever>) -> Result<Self> {
        let generation = llm.default_config();

        Ok(Self {
            llm,
            retriever,
            qa_prompt: qa_prompt()?,
            styled_prompt: styled_qa_prompt()?,
            condense_prompt: condense_question_prompt()?,
            style: StyleOptions::default(),
            generation,
        })
    }

    pub fn with_style(mut self, style: StyleOptions) -> Self {
        self.style = style;
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn set_style(&mut self, style: StyleOptions) {
        self.style = style;
    }

    pub fn style(&self) -> &StyleOptions {
        &self.style
    }

    /// Answer `question` and record the turn in `memory`
    pub async fn invoke(
        &self,
        question: &str,
        memory: &mut ConversationBufferMemory,
    ) -> Result<QaResponse> {
        let (question, generated_question, source_documents) = self.prepare(question, memory).await?;

        let answer = match self.render_answer_prompt(&generated_question, &source_documents, memory)? {
            Some(prompt) => {
                let result = self.llm.generate_with_config(&prompt, &self.generation).await?;
                result.text.trim().to_string()
            }
            None => REFUSAL_SENTENCE.to_string(),
        };

        Ok(self.finish(question, generated_question, answer, source_documents, memory))
    }

    /// Like [`invoke`](Self::invoke), passing each answer fragment to
    /// `on_token` as it arrives
    pub async fn invoke_stream<F>(
        &self,
        question: &str,
        memory: &mut ConversationBufferMemory,
        mut on_token: F,
    ) -> Result<QaResponse>
    where
        F: FnMut(&str) + Send,
    {
        let (question, generated_question, source_documents) = self.prepare(question, memory).await?;

        let answer = match self.render_answer_prompt(&generated_question, &source_documents, memory)? {
            Some(prompt) => {
                let mut stream = self.llm.generate_stream(&prompt, &self.generation).await?;
                let mut answer = String::new();
                while let Some(token) = stream.next().await {
                    let token = token?;
                    on_token(&token);
                    answer.push_str(&token);
                }
                answer.trim().to_string()
            }
            None => {
                on_token(REFUSAL_SENTENCE);
                REFUSAL_SENTENCE.to_string()
            }
        };

        Ok(self.finish(question, generated_question, answer, source_documents, memory))
    }

    /// Validate the question, condense it against the history and retrieve
    async fn prepare(
        &self,
        question: &str,
        memory: &ConversationBufferMemory,
    ) -> Result<(String, String, Vec<RetrievedChunk>)> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question cannot be empty".to_string()));
        }

        let generated_question = self.condense_question(question, memory).await?;
        let source_documents = self.retriever.retrieve(&generated_question).await?;
        debug!(
            question = %generated_question,
            retrieved = source_documents.len(),
            "retrieved context"
        );

        Ok((question.to_string(), generated_question, source_documents))
    }

    async fn condense_question(
        &self,
        question: &str,
        memory: &ConversationBufferMemory,
    ) -> Result<String> {
        if memory.is_empty() {
            return Ok(question.to_string());
        }

        let history = memory.buffer_as_str();
        let prompt = self
            .condense_prompt
            .format(&[("chat_history", history.as_str()), ("question", question)])?;
        let result = self.llm.generate_with_config(&prompt, &self.generation).await?;

        let standalone = result.text.trim();
        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            debug!(standalone, "condensed follow-up question");
            Ok(standalone.to_string())
        }
    }

    /// Build the answer prompt, or `None` when there is nothing to answer from
    fn render_answer_prompt(
        &self,
        question: &str,
        source_documents: &[RetrievedChunk],
        memory: &ConversationBufferMemory,
    ) -> Result<Option<String>> {
        if source_documents.is_empty() {
            info!("no relevant context retrieved, refusing");
            return Ok(None);
        }

        let context = source_documents
            .iter()
            .map(|doc| doc.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let history = memory.buffer_as_str();

        let prompt = if self.style == StyleOptions::default() {
            self.qa_prompt.format(&[
                ("context", context.as_str()),
                ("chat_history", history.as_str()),
                ("question", question),
            ])?
        } else {
            self.styled_prompt.format(&[
                ("tone", tone_instruction(self.style.tone)),
                ("language", self.style.language.as_str()),
                ("context", context.as_str()),
                ("chat_history", history.as_str()),
                ("question", question),
            ])?
        };

        Ok(Some(prompt))
    }

    fn finish(
        &self,
        question: String,
        generated_question: String,
        answer: String,
        source_documents: Vec<RetrievedChunk>,
        memory: &mut ConversationBufferMemory,
    ) -> QaResponse {
        memory.save_context(question.clone(), answer.clone());

        QaResponse {
            question,
            generated_question,
            answer,
            source_documents,
        }
    }
}
