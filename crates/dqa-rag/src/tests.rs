//! Pipeline tests with scripted models

/// Build a minimal PDF with one line of Helvetica text per page
///
/// Page text must be plain ASCII without parentheses or backslashes.
pub(crate) fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", text);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));

    pdf.into_bytes()
}

#[cfg(test)]
mod pipeline_tests {
    use crate::{
        ConversationBufferMemory, ConversationalQaChain, ContextualCompressionRetriever,
        CrossEncoderReranker, DocumentIndexer, FlatIndex, HashingEmbeddings,
        RecursiveCharacterTextSplitter, REFUSAL_SENTENCE, Summarizer, SummaryStrategy,
        VectorStoreRetriever,
    };
    use async_trait::async_trait;
    use dqa_core::{
        Chunk, ChunkMetadata, CrossEncoder, Error, GenerationConfig, GenerationResult,
        LLMProvider, Result, RetrievedChunk, Retriever, SourceFile, StyleOptions, Tone,
        TokenStream,
    };
    use futures::stream;
    use insta::assert_yaml_snapshot;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replies with queued answers and records every prompt it receives
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        fn next_reply(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::LLMProvider("no scripted reply left".to_string()))
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
            self.generate_with_config(prompt, &self.default_config()).await
        }

        async fn generate_with_config(
            &self,
            prompt: &str,
            config: &GenerationConfig,
        ) -> Result<GenerationResult> {
            Ok(GenerationResult {
                text: self.next_reply(prompt)?,
                model_id: config.model_id.clone(),
                tokens_used: None,
            })
        }

        async fn generate_stream(
            &self,
            prompt: &str,
            _config: &GenerationConfig,
        ) -> Result<TokenStream> {
            let reply = self.next_reply(prompt)?;
            let tokens: Vec<Result<String>> = reply
                .split_inclusive(' ')
                .map(|t| Ok(t.to_string()))
                .collect();
            Ok(Box::pin(stream::iter(tokens)))
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    /// Returns fixed chunks and records the queries it was asked
    struct RecordingRetriever {
        results: Vec<RetrievedChunk>,
        queries: Mutex<Vec<String>>,
    }

    impl RecordingRetriever {
        fn new(results: Vec<RetrievedChunk>) -> Arc<Self> {
            Arc::new(Self { results, queries: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl Retriever for RecordingRetriever {
        async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.results.clone())
        }
    }

    /// Counts query words present in each passage
    struct KeywordEncoder;

    #[async_trait]
    impl CrossEncoder for KeywordEncoder {
        async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
            let words: Vec<String> = query
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 3)
                .map(|w| w.to_lowercase())
                .collect();
            Ok(passages
                .iter()
                .map(|p| {
                    let p = p.to_lowercase();
                    words.iter().filter(|w| p.contains(w.as_str())).count() as f32
                })
                .collect())
        }

        fn model_id(&self) -> &str {
            "keyword"
        }
    }

    fn chunk(source: &str, page: Option<u32>, index: usize, text: &str) -> Chunk {
        Chunk::new(
            text,
            ChunkMetadata { source: source.to_string(), page, chunk_index: index },
        )
    }

    fn attention_chunk() -> RetrievedChunk {
        RetrievedChunk {
            chunk: chunk(
                "paper.pdf",
                Some(3),
                0,
                "Attention maps a query and a set of key-value pairs to an output.",
            ),
            score: 0.5,
        }
    }

    #[tokio::test]
    async fn test_answer_snapshot() {
        let llm = ScriptedLlm::new(&["  Attention weighs values by query-key similarity. \n"]);
        let retriever = RecordingRetriever::new(vec![attention_chunk()]);
        let chain = ConversationalQaChain::new(llm.clone(), retriever).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let response = chain.invoke("What is attention?", &mut memory).await.unwrap();

        assert_yaml_snapshot!(response, {
            ".source_documents[].chunk.id" => "[id]",
            ".source_documents[].score" => "[score]",
        }, @r###"
        ---
        question: What is attention?
        generated_question: What is attention?
        answer: Attention weighs values by query-key similarity.
        source_documents:
          - chunk:
              id: "[id]"
              content: Attention maps a query and a set of key-value pairs to an output.
              metadata:
                source: paper.pdf
                page: 3
                chunk_index: 0
            score: "[score]"
        "###);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(
            "Context: Attention maps a query and a set of key-value pairs to an output.\n"
        ));
        assert!(prompts[0].contains(REFUSAL_SENTENCE));
        assert_eq!(memory.len(), 1);
        assert_eq!(response.citations()[0].page, Some(3));
    }

    #[tokio::test]
    async fn test_refuses_without_context() {
        let llm = ScriptedLlm::new(&[]);
        let chain = ConversationalQaChain::new(llm.clone(), RecordingRetriever::new(Vec::new())).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let response = chain.invoke("Who won the 1998 World Cup?", &mut memory).await.unwrap();

        assert_eq!(response.answer, REFUSAL_SENTENCE);
        assert!(response.is_refusal());
        assert!(response.source_documents.is_empty());
        assert!(llm.prompts().is_empty());
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let llm = ScriptedLlm::new(&[]);
        let chain = ConversationalQaChain::new(llm, RecordingRetriever::new(Vec::new())).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let result = chain.invoke("   ", &mut memory).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_is_condensed_and_memory_grows_one_turn_each() {
        let llm = ScriptedLlm::new(&[
            "It maps queries to outputs.",
            "Who introduced the attention mechanism?",
            "Vaswani et al.",
        ]);
        let retriever = RecordingRetriever::new(vec![attention_chunk()]);
        let chain = ConversationalQaChain::new(llm.clone(), retriever.clone()).unwrap();
        let mut memory = ConversationBufferMemory::new();

        chain.invoke("What is attention?", &mut memory).await.unwrap();
        assert_eq!(memory.len(), 1);

        let response = chain.invoke("Who introduced it?", &mut memory).await.unwrap();
        assert_eq!(memory.len(), 2);
        assert_eq!(response.question, "Who introduced it?");
        assert_eq!(response.generated_question, "Who introduced the attention mechanism?");
        assert_eq!(response.answer, "Vaswani et al.");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Human: What is attention?\nAssistant: It maps queries to outputs."));
        assert!(prompts[1].contains("Follow Up Input: Who introduced it?"));
        assert!(prompts[2].contains("Question: Who introduced the attention mechanism?"));

        let queries = retriever.queries.lock().unwrap().clone();
        assert_eq!(queries, vec!["What is attention?", "Who introduced the attention mechanism?"]);

        // memory keeps what the user actually asked
        assert_eq!(memory.turns()[1].human, "Who introduced it?");
        assert_eq!(memory.turns()[1].ai, "Vaswani et al.");
    }

    #[tokio::test]
    async fn test_streaming_delivers_every_token() {
        let llm = ScriptedLlm::new(&["Attention relates every position to every other."]);
        let chain = ConversationalQaChain::new(llm, RecordingRetriever::new(vec![attention_chunk()])).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let mut tokens = Vec::new();
        let response = chain
            .invoke_stream("What is attention?", &mut memory, |t| tokens.push(t.to_string()))
            .await
            .unwrap();

        assert!(tokens.len() > 1);
        assert_eq!(tokens.concat(), response.answer);
        assert_eq!(memory.turns()[0].ai, "Attention relates every position to every other.");
    }

    #[tokio::test]
    async fn test_streaming_refusal_is_emitted_once() {
        let llm = ScriptedLlm::new(&[]);
        let chain = ConversationalQaChain::new(llm, RecordingRetriever::new(Vec::new())).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let mut tokens = Vec::new();
        chain
            .invoke_stream("Anything?", &mut memory, |t| tokens.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(tokens, vec![REFUSAL_SENTENCE.to_string()]);
    }

    #[tokio::test]
    async fn test_style_reaches_the_prompt() {
        let llm = ScriptedLlm::new(&["Réponse."]);
        let style = StyleOptions { tone: Tone::Concise, language: "French".to_string() };
        let chain = ConversationalQaChain::new(llm.clone(), RecordingRetriever::new(vec![attention_chunk()]))
            .unwrap()
            .with_style(style);
        let mut memory = ConversationBufferMemory::new();

        chain.invoke("What is attention?", &mut memory).await.unwrap();

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Write the answer in French."));
        assert!(prompt.contains("at most two sentences"));
    }

    #[tokio::test]
    async fn test_end_to_end_with_offline_embeddings() {
        let files = vec![
            SourceFile::new(
                "transformer.txt",
                b"The Transformer uses multi-head self attention in every encoder and decoder layer.".to_vec(),
            ),
            SourceFile::new(
                "fruit.txt",
                b"Bananas are a yellow fruit rich in potassium and grown in tropical regions.".to_vec(),
            ),
        ];

        let indexer = DocumentIndexer::new(RecursiveCharacterTextSplitter::new(1000, 200).unwrap());
        let ingested = indexer.process(&files).await.unwrap();
        assert_eq!(ingested.files, 2);
        assert_eq!(ingested.chunks.len(), 2);

        let index = FlatIndex::build(ingested.chunks, Arc::new(HashingEmbeddings::default()))
            .await
            .unwrap();
        let base = Arc::new(VectorStoreRetriever::new(Arc::new(index), 10));
        let retriever = Arc::new(ContextualCompressionRetriever::new(
            base,
            CrossEncoderReranker::new(Arc::new(KeywordEncoder), 1),
        ));

        let llm = ScriptedLlm::new(&["Multi-head self attention."]);
        let chain = ConversationalQaChain::new(llm, retriever).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let response = chain
            .invoke("What attention does the Transformer use in each encoder layer?", &mut memory)
            .await
            .unwrap();

        assert_eq!(response.source_documents.len(), 1);
        assert_eq!(response.source_documents[0].chunk.metadata.source, "transformer.txt");
        assert_eq!(response.answer, "Multi-head self attention.");
    }

    #[tokio::test]
    async fn test_pdf_pages_reach_citations() {
        let pdf = super::text_pdf(&[
            "The encoder maps symbols to representations",
            "The decoder generates the output sequence",
        ]);
        let indexer = DocumentIndexer::new(RecursiveCharacterTextSplitter::new(1000, 200).unwrap());
        let ingested = indexer
            .process(&[SourceFile::new("paper.pdf", pdf)])
            .await
            .unwrap();

        assert_eq!(ingested.pages, 2);
        let pages: Vec<Option<u32>> = ingested.chunks.iter().map(|c| c.metadata.page).collect();
        assert_eq!(pages, vec![Some(1), Some(2)]);

        let index = FlatIndex::build(ingested.chunks, Arc::new(HashingEmbeddings::default()))
            .await
            .unwrap();
        let base = Arc::new(VectorStoreRetriever::new(Arc::new(index), 10));
        let retriever = Arc::new(ContextualCompressionRetriever::new(
            base,
            CrossEncoderReranker::new(Arc::new(KeywordEncoder), 1),
        ));
        let chain = ConversationalQaChain::new(ScriptedLlm::new(&["It generates the output."]), retriever).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let response = chain
            .invoke("What does the decoder generate?", &mut memory)
            .await
            .unwrap();

        let citations = response.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source, "paper.pdf");
        assert_eq!(citations[0].page, Some(2));
        assert!(citations[0].excerpt.contains("decoder generates"));
    }

    #[tokio::test]
    async fn test_reranker_failure_propagates() {
        struct BrokenEncoder;

        #[async_trait]
        impl CrossEncoder for BrokenEncoder {
            async fn score(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
                Err(Error::Reranker("model not loaded".to_string()))
            }

            fn model_id(&self) -> &str {
                "broken"
            }
        }

        let retriever = Arc::new(ContextualCompressionRetriever::new(
            RecordingRetriever::new(vec![attention_chunk()]),
            CrossEncoderReranker::new(Arc::new(BrokenEncoder), 3),
        ));
        let chain = ConversationalQaChain::new(ScriptedLlm::new(&["unused"]), retriever).unwrap();
        let mut memory = ConversationBufferMemory::new();

        let result = chain.invoke("What is attention?", &mut memory).await;
        assert!(matches!(result, Err(Error::Reranker(_))));
        assert!(memory.is_empty());
    }

    fn numbered_chunks(count: usize) -> Vec<Chunk> {
        (0..count)
            .map(|i| chunk("report.pdf", Some(i as u32 + 1), i, &format!("Section {:02} text.", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_stuff_summary_samples_both_ends() {
        let llm = ScriptedLlm::new(&["A short report."]);
        let summarizer = Summarizer::new(llm.clone(), 2).unwrap();

        let summary = summarizer
            .summarize(&numbered_chunks(10), SummaryStrategy::Stuff)
            .await
            .unwrap();
        assert_eq!(summary, "A short report.");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        for kept in ["Section 00", "Section 01", "Section 08", "Section 09"] {
            assert!(prompts[0].contains(kept), "missing {}", kept);
        }
        assert!(!prompts[0].contains("Section 05"));
    }

    #[test]
    fn test_stuff_summary_uses_all_chunks_when_ends_overlap() {
        let llm = ScriptedLlm::new(&["summary"]);
        let summarizer = Summarizer::new(llm, 3).unwrap();
        let chunks = numbered_chunks(5);

        let sampled = summarizer.sample_chunks(&chunks);
        assert_eq!(sampled.len(), 5);
        assert_eq!(sampled[4].content, "Section 04 text.");
    }

    #[tokio::test]
    async fn test_refine_summary_visits_every_chunk() {
        let llm = ScriptedLlm::new(&["draft one", "draft two", "final summary"]);
        let summarizer = Summarizer::new(llm.clone(), 3).unwrap();

        let summary = summarizer
            .summarize(&numbered_chunks(3), SummaryStrategy::Refine)
            .await
            .unwrap();
        assert_eq!(summary, "final summary");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("Section 00"));
        assert!(prompts[1].contains("existing summary up to a certain point: draft one"));
        assert!(prompts[1].contains("Section 01"));
        assert!(prompts[2].contains("draft two"));
        assert!(prompts[2].contains("Section 02"));
    }

    #[test]
    fn test_summarizer_rejects_zero_sample() {
        let result = Summarizer::new(ScriptedLlm::new(&[]), 0);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_summary_without_chunks() {
        let summarizer = Summarizer::new(ScriptedLlm::new(&[]), 3).unwrap();
        let result = summarizer.summarize(&[], SummaryStrategy::Stuff).await;
        assert!(matches!(result, Err(Error::NoDocuments(_))));
    }

    #[test]
    fn test_summary_strategy_parsing() {
        assert_eq!("Refine".parse::<SummaryStrategy>().unwrap(), SummaryStrategy::Refine);
        assert_eq!("stuff".parse::<SummaryStrategy>().unwrap(), SummaryStrategy::Stuff);
        assert!("map_reduce".parse::<SummaryStrategy>().is_err());
        assert_eq!(SummaryStrategy::Refine.to_string(), "refine");
    }
}
