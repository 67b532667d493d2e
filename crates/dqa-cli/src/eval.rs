//! Answer quality evaluation over a question set

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use dqa_core::{EmbeddingProvider, Error, LLMProvider, Result};
use dqa_rag::statement_support_prompt;

use crate::session::Session;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+(?:\.[0-9]+)?").expect("valid regex"));
static STATEMENT_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid regex"));

/// A question with the answer it should receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub question: String,
    pub ground_truth: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationDataset {
    pub samples: Vec<EvaluationSample>,
}

impl Default for EvaluationDataset {
    /// Questions about "Attention Is All You Need"
    fn default() -> Self {
        let pairs = [
            (
                "What are the two main components of the Transformer architecture?",
                "The Transformer architecture is based on two main components: an encoder and a decoder.",
            ),
            (
                "What is the core mechanism the Transformer is based on?",
                "The Transformer is the first transduction model relying entirely on self-attention.",
            ),
            (
                "What is the title of the paper mentioned in the context?",
                "Attention Is All You Need",
            ),
            (
                "What BLEU score did the big transformer model achieve on the WMT 2014 English-to-German translation task?",
                "The big transformer model achieved a BLEU score of 28.4.",
            ),
        ];

        Self {
            samples: pairs
                .iter()
                .map(|(question, ground_truth)| EvaluationSample {
                    question: question.to_string(),
                    ground_truth: ground_truth.to_string(),
                })
                .collect(),
        }
    }
}

impl EvaluationDataset {
    /// Parse a JSON list of `{question, ground_truth}` objects
    pub fn from_json(json: &str) -> Result<Self> {
        let dataset: Self = serde_json::from_str(json)?;
        if dataset.samples.is_empty() {
            return Err(Error::InvalidInput("evaluation dataset has no questions".to_string()));
        }
        Ok(dataset)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Result of asking one evaluation question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
    /// Share of ground-truth tokens found in the retrieved contexts
    pub context_recall: f32,
    /// Share of ground-truth tokens found in the answer
    pub answer_overlap: f32,
    /// Share of answer statements the judge model finds supported by the contexts
    pub faithfulness: f32,
    /// Cosine similarity between the question and answer embeddings
    pub answer_relevancy: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub records: Vec<EvaluationRecord>,
    pub mean_context_recall: f32,
    pub mean_answer_overlap: f32,
    pub mean_faithfulness: f32,
    pub mean_answer_relevancy: f32,
}

impl EvaluationReport {
    fn from_records(records: Vec<EvaluationRecord>) -> Self {
        let mean = |metric: fn(&EvaluationRecord) -> f32| {
            if records.is_empty() {
                0.0
            } else {
                records.iter().map(metric).sum::<f32>() / records.len() as f32
            }
        };

        Self {
            mean_context_recall: mean(|r| r.context_recall),
            mean_answer_overlap: mean(|r| r.answer_overlap),
            mean_faithfulness: mean(|r| r.faithfulness),
            mean_answer_relevancy: mean(|r| r.answer_relevancy),
            records,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn tokens(text: &str) -> HashSet<String> {
    TOKEN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fraction of the reference's distinct tokens that also occur in `text`
pub fn token_recall(reference: &str, text: &str) -> f32 {
    let expected = tokens(reference);
    if expected.is_empty() {
        return 0.0;
    }

    let found = tokens(text);
    expected.iter().filter(|token| found.contains(*token)).count() as f32 / expected.len() as f32
}

/// Split an answer into sentence-level statements
fn statements(answer: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut start = 0;
    for end in STATEMENT_END.find_iter(answer) {
        found.push(answer[start..end.end()].trim());
        start = end.end();
    }
    found.push(answer[start..].trim());
    found.retain(|statement| !statement.is_empty());
    found
}

/// Fraction of the answer's statements that `judge` finds supported by `contexts`
///
/// Each statement is graded on its own; a verdict starting with "yes" counts
/// as supported. An answer with no statements or no contexts scores zero.
pub async fn faithfulness(
    judge: &dyn LLMProvider,
    answer: &str,
    contexts: &[String],
) -> Result<f32> {
    let statements = statements(answer);
    if statements.is_empty() || contexts.is_empty() {
        return Ok(0.0);
    }

    let prompt = statement_support_prompt()?;
    let context = contexts.join("\n\n");
    let mut supported = 0usize;

    for statement in &statements {
        let request = prompt.format(&[("context", context.as_str()), ("statement", *statement)])?;
        let verdict = judge.generate(&request).await?;
        if verdict.text.trim_start().to_lowercase().starts_with("yes") {
            supported += 1;
        }
    }

    debug!(statements = statements.len(), supported, "graded answer faithfulness");
    Ok(supported as f32 / statements.len() as f32)
}

/// Cosine similarity of the question and answer embeddings
pub async fn answer_relevancy(
    embedder: &dyn EmbeddingProvider,
    question: &str,
    answer: &str,
) -> Result<f32> {
    if question.trim().is_empty() || answer.trim().is_empty() {
        return Ok(0.0);
    }

    let question = embedder.embed_query(question).await?;
    let answer = embedder.embed_query(answer).await?;
    Ok(cosine(&question, &answer))
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Ask every dataset question in one conversation and score the results
pub async fn run_evaluation(session: &mut Session, dataset: &EvaluationDataset) -> Result<EvaluationReport> {
    let mut records = Vec::with_capacity(dataset.len());
    let judge = session.llm().clone();
    let embedder = session.embedder().clone();

    for (i, sample) in dataset.samples.iter().enumerate() {
        info!(index = i + 1, total = dataset.len(), question = %sample.question, "running evaluation question");

        let response = session.ask(&sample.question).await?;
        let contexts: Vec<String> = response
            .source_documents
            .iter()
            .map(|doc| doc.chunk.content.clone())
            .collect();

        let faithfulness = faithfulness(judge.as_ref(), &response.answer, &contexts).await?;
        let answer_relevancy =
            answer_relevancy(embedder.as_ref(), &sample.question, &response.answer).await?;

        records.push(EvaluationRecord {
            context_recall: token_recall(&sample.ground_truth, &contexts.join("\n")),
            answer_overlap: token_recall(&sample.ground_truth, &response.answer),
            question: sample.question.clone(),
            answer: response.answer,
            contexts,
            ground_truth: sample.ground_truth.clone(),
            faithfulness,
            answer_relevancy,
        });
    }

    Ok(EvaluationReport::from_records(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dqa_core::{GenerationConfig, GenerationResult, TokenStream};
    use dqa_rag::HashingEmbeddings;
    use futures::stream;
    use std::sync::Mutex;

    /// Supports a statement only when it mentions one of `known`
    struct KeywordJudge {
        known: Vec<&'static str>,
        graded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMProvider for KeywordJudge {
        async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
            self.generate_with_config(prompt, &self.default_config()).await
        }

        async fn generate_with_config(
            &self,
            prompt: &str,
            config: &GenerationConfig,
        ) -> Result<GenerationResult> {
            let statement = prompt
                .lines()
                .find_map(|line| line.strip_prefix("Statement: "))
                .unwrap_or_default()
                .to_string();
            let supported = self.known.iter().any(|word| statement.contains(word));
            self.graded.lock().unwrap().push(statement);

            Ok(GenerationResult {
                text: if supported { " Yes." } else { "No" }.to_string(),
                model_id: config.model_id.clone(),
                tokens_used: None,
            })
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _config: &GenerationConfig,
        ) -> Result<TokenStream> {
            Ok(Box::pin(stream::iter(Vec::<Result<String>>::new())))
        }

        fn model_id(&self) -> &str {
            "judge"
        }
    }

    #[test]
    fn test_default_dataset() {
        let dataset = EvaluationDataset::default();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.samples[2].ground_truth, "Attention Is All You Need");
    }

    #[test]
    fn test_dataset_from_json() {
        let json = r#"[{"question": "Q1?", "ground_truth": "A1"}]"#;
        let dataset = EvaluationDataset::from_json(json).unwrap();
        assert_eq!(dataset.samples[0].question, "Q1?");

        assert!(EvaluationDataset::from_json("[]").is_err());
        assert!(EvaluationDataset::from_json("{").is_err());
    }

    #[test]
    fn test_token_recall() {
        assert_eq!(token_recall("Attention Is All You Need", "attention is all you need!"), 1.0);
        assert_eq!(token_recall("encoder decoder", "only the encoder"), 0.5);
        assert_eq!(token_recall("a BLEU score of 28.4", "BLEU of 28.4, a score"), 1.0);
        assert_eq!(token_recall("", "anything"), 0.0);
    }

    #[test]
    fn test_statements() {
        assert_eq!(
            statements("It has six layers. Each uses attention!  BLEU was 28.4?"),
            vec!["It has six layers.", "Each uses attention!", "BLEU was 28.4?"]
        );
        assert_eq!(statements("A score of 28.4 on WMT"), vec!["A score of 28.4 on WMT"]);
        assert!(statements("  ").is_empty());
    }

    #[tokio::test]
    async fn test_faithfulness_grades_each_statement() {
        let judge = KeywordJudge { known: vec!["encoder"], graded: Mutex::new(Vec::new()) };
        let contexts = vec!["The encoder is a stack of six layers.".to_string()];

        let score = faithfulness(&judge, "The encoder has six layers. It was trained on Mars.", &contexts)
            .await
            .unwrap();

        assert_eq!(score, 0.5);
        assert_eq!(
            *judge.graded.lock().unwrap(),
            vec!["The encoder has six layers.".to_string(), "It was trained on Mars.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_faithfulness_without_contexts_is_zero() {
        let judge = KeywordJudge { known: vec!["encoder"], graded: Mutex::new(Vec::new()) };

        assert_eq!(faithfulness(&judge, "The encoder.", &[]).await.unwrap(), 0.0);
        assert_eq!(faithfulness(&judge, "", &["context".to_string()]).await.unwrap(), 0.0);
        assert!(judge.graded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_relevancy() {
        let embedder = HashingEmbeddings::default();

        let same = answer_relevancy(&embedder, "encoder decoder stacks", "Encoder decoder stacks")
            .await
            .unwrap();
        assert!((same - 1.0).abs() < 1e-5);

        let related = answer_relevancy(&embedder, "How many encoder layers?", "The encoder has six layers.")
            .await
            .unwrap();
        let unrelated = answer_relevancy(&embedder, "How many encoder layers?", "Bananas grow in tropical regions.")
            .await
            .unwrap();
        assert!(related > unrelated);

        assert_eq!(answer_relevancy(&embedder, "question", "  ").await.unwrap(), 0.0);
    }

    #[test]
    fn test_cosine() {
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
