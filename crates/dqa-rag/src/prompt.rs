//! Prompt templates

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use dqa_core::{Error, Result, Tone};

/// Returned verbatim when the retrieved context cannot answer the question
pub const REFUSAL_SENTENCE: &str =
    "I cannot answer this question based on the provided document context.";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

const QA_TEMPLATE: &str = "\
You are a specialized AI assistant for answering questions based strictly on a given document.
You are given a context from the document and a question. Your task is to provide a concise answer.

**IMPORTANT: Your entire response MUST be based ONLY on the text provided in the 'Context' section.**
Do not use any of your own knowledge.

Follow these rules with no exceptions:
1.  Analyze the 'Context' to see if it contains the information needed to answer the 'Question'.
2.  If the context contains the answer, formulate a direct and concise response based on that information.
3.  If the context does NOT contain the information, you MUST respond with the single sentence: '{refusal}'

Context: {context}
Chat History: {chat_history}
Question: {question}

Based strictly on the context provided, here is the answer:
";

const STYLED_QA_TEMPLATE: &str = "\
You are a specialized AI assistant for answering questions based strictly on a given document.
You are given a context from the document and a question.

**IMPORTANT: Your entire response MUST be based ONLY on the text provided in the 'Context' section.**
Do not use any of your own knowledge.

Follow these rules with no exceptions:
1.  Analyze the 'Context' to see if it contains the information needed to answer the 'Question'.
2.  If the context contains the answer, respond based on that information. {tone}
3.  Write the answer in {language}.
4.  If the context does NOT contain the information, you MUST respond with the single sentence: '{refusal}'

Context: {context}
Chat History: {chat_history}
Question: {question}

Based strictly on the context provided, here is the answer:
";

const CONDENSE_QUESTION_TEMPLATE: &str = "\
Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

const STUFF_SUMMARY_TEMPLATE: &str = "\
Write a concise summary of the following:


\"{text}\"


CONCISE SUMMARY:";

const REFINE_SUMMARY_TEMPLATE: &str = "\
Your job is to produce a final summary.
We have provided an existing summary up to a certain point: {existing_summary}
We have the opportunity to refine the existing summary (only if needed) with some more context below.
------------
{text}
------------
Given the new context, refine the original summary.
If the context isn't useful, return the original summary.";

const STATEMENT_SUPPORT_TEMPLATE: &str = "\
Decide whether the statement below can be directly inferred from the context.
Reply with a single word: Yes or No.

Context:
{context}

Statement: {statement}
Verdict:";

/// A text template with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Create a template, checking that `input_variables` names exactly the
    /// placeholders that occur in `template`
    pub fn new(template: impl Into<String>, input_variables: &[&str]) -> Result<Self> {
        let template = template.into();

        let found: BTreeSet<&str> = PLACEHOLDER
            .captures_iter(&template)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        let declared: BTreeSet<&str> = input_variables.iter().copied().collect();

        if found != declared {
            let missing: Vec<&str> = found.difference(&declared).copied().collect();
            let unused: Vec<&str> = declared.difference(&found).copied().collect();
            return Err(Error::Configuration(format!(
                "prompt variables do not match template placeholders (undeclared: [{}], not in template: [{}])",
                missing.join(", "),
                unused.join(", ")
            )));
        }

        Ok(Self {
            template,
            input_variables: input_variables.iter().map(|v| v.to_string()).collect(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Bind fixed values now, leaving the remaining variables open
    pub fn partial(&self, values: &[(&str, &str)]) -> Self {
        let bound = |name: &str| values.iter().find(|(key, _)| *key == name).map(|(_, v)| *v);

        let template = PLACEHOLDER.replace_all(&self.template, |caps: &regex::Captures| {
            let name = &caps[1];
            bound(name).map(str::to_string).unwrap_or_else(|| caps[0].to_string())
        });

        let remaining: Vec<&str> = self
            .input_variables
            .iter()
            .map(String::as_str)
            .filter(|name| bound(*name).is_none())
            .collect();

        Self {
            template: template.into_owned(),
            input_variables: remaining.into_iter().map(str::to_string).collect(),
        }
    }

    /// Substitute every placeholder; values are inserted as-is
    pub fn format(&self, values: &[(&str, &str)]) -> Result<String> {
        for name in &self.input_variables {
            if !values.iter().any(|(key, _)| *key == name.as_str()) {
                return Err(Error::InvalidInput(format!("missing value for prompt variable '{}'", name)));
            }
        }

        let rendered = PLACEHOLDER.replace_all(&self.template, |caps: &regex::Captures| {
            let name = &caps[1];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default()
        });

        Ok(rendered.into_owned())
    }
}

/// Answer prompt over `context`, `chat_history` and `question`
pub fn qa_prompt() -> Result<PromptTemplate> {
    let template =
        PromptTemplate::new(QA_TEMPLATE, &["refusal", "context", "chat_history", "question"])?;
    Ok(template.partial(&[("refusal", REFUSAL_SENTENCE)]))
}

/// Answer prompt that also takes `tone` and `language`
pub fn styled_qa_prompt() -> Result<PromptTemplate> {
    let template = PromptTemplate::new(
        STYLED_QA_TEMPLATE,
        &["refusal", "tone", "language", "context", "chat_history", "question"],
    )?;
    Ok(template.partial(&[("refusal", REFUSAL_SENTENCE)]))
}

/// Rewrites a follow-up into a standalone question
pub fn condense_question_prompt() -> Result<PromptTemplate> {
    PromptTemplate::new(CONDENSE_QUESTION_TEMPLATE, &["chat_history", "question"])
}

pub fn stuff_summary_prompt() -> Result<PromptTemplate> {
    PromptTemplate::new(STUFF_SUMMARY_TEMPLATE, &["text"])
}

pub fn refine_summary_prompt() -> Result<PromptTemplate> {
    PromptTemplate::new(REFINE_SUMMARY_TEMPLATE, &["existing_summary", "text"])
}

/// Asks a judge model whether `statement` is supported by `context`
pub fn statement_support_prompt() -> Result<PromptTemplate> {
    PromptTemplate::new(STATEMENT_SUPPORT_TEMPLATE, &["context", "statement"])
}

/// Instruction substituted for `{tone}` in the styled answer prompt
pub fn tone_instruction(tone: Tone) -> &'static str {
    match tone {
        Tone::Neutral => "Keep the answer direct and concise.",
        Tone::Professional => "Use a formal, professional register.",
        Tone::Friendly => "Use a warm, conversational register.",
        Tone::Concise => "Answer in at most two sentences.",
        Tone::Detailed => "Give a thorough answer that covers every relevant point in the context.",
    }
}
