//! Ollama client implementation

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use dqa_core::{
    EmbeddingProvider, GenerationConfig, GenerationResult, LLMProvider, TokenStream,
    Error, Result,
};

use crate::config::OllamaConfig;

/// Ollama chat and embedding client
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    done: bool,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

/// One decoded record of a streamed chat response
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamEvent {
    pub token: String,
    pub done: bool,
}

/// Models present on the server, as reported by the health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAvailability {
    pub chat_model: bool,
    pub embedding_model: bool,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Create a new Ollama client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = OllamaConfig::from_env()?;
        Self::new(config)
    }

    /// Set the chat model to use for generation
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.config.chat_model = model_id.into();
        self
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Check that the server answers and report which configured models are pulled
    pub async fn health_check(&self) -> Result<ModelAvailability> {
        let url = self.config.endpoint("api/tags");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Ollama server unreachable at {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "Ollama health check failed with status {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
        let availability = ModelAvailability {
            chat_model: model_present(&names, &self.config.chat_model),
            embedding_model: model_present(&names, &self.config.embedding_model),
        };

        if !availability.chat_model {
            warn!(model = %self.config.chat_model, "chat model is not pulled on the Ollama server");
        }
        if !availability.embedding_model {
            warn!(model = %self.config.embedding_model, "embedding model is not pulled on the Ollama server");
        }

        Ok(availability)
    }

    pub(crate) fn chat_request(&self, prompt: &str, config: &GenerationConfig, stream: bool) -> ChatRequest {
        ChatRequest {
            model: config.model_id.clone(),
            messages: vec![ChatRequestMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream,
            options: ChatOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
                stop: config.stop_sequences.clone(),
            },
        }
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = self.config.endpoint("api/chat");
        debug!(model = %request.model, stream = request.stream, "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::LLMProvider(format!(
                "Ollama chat request failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.config.endpoint("api/embed");
        let request = EmbedRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Embedding(format!(
                "Ollama embed request failed with status {}: {}",
                status, error_text
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        check_embedding_count(texts.len(), body.embeddings)
    }
}

/// Reject a response that does not carry exactly one vector per input
fn check_embedding_count(expected: usize, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        return Err(Error::Embedding(format!(
            "expected {} embeddings, received {}",
            expected,
            embeddings.len()
        )));
    }
    Ok(embeddings)
}

fn model_present(names: &[&str], model: &str) -> bool {
    names
        .iter()
        .any(|name| *name == model || name.strip_prefix(model).is_some_and(|rest| rest.starts_with(':')))
}

/// Decode one line of Ollama's newline-delimited JSON stream
pub(crate) fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let record: ChatResponse = serde_json::from_str(line)
        .map_err(|e| Error::Serialization(format!("bad stream record '{}': {}", line, e)))?;

    if let Some(error) = record.error {
        return Err(Error::LLMProvider(error));
    }

    Ok(Some(StreamEvent {
        token: record.message.map(|m| m.content).unwrap_or_default(),
        done: record.done,
    }))
}

struct StreamState {
    bytes: BoxStream<'static, Result<Vec<u8>>>,
    buffer: Vec<u8>,
    exhausted: bool,
    finished: bool,
}

/// Turn a byte stream of JSON lines into a stream of text fragments
pub(crate) fn decode_token_stream(bytes: BoxStream<'static, Result<Vec<u8>>>) -> TokenStream {
    let state = StreamState {
        bytes,
        buffer: Vec::new(),
        exhausted: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);

                match parse_stream_line(&line) {
                    Ok(Some(event)) => {
                        state.finished = event.done;
                        if !event.token.is_empty() {
                            return Some((Ok(event.token), state));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
                continue;
            }

            if state.exhausted {
                if state.buffer.iter().all(|b| b.is_ascii_whitespace()) {
                    return None;
                }
                // flush a final record that lacks its newline
                state.buffer.push(b'\n');
                continue;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => state.exhausted = true,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        let config = self.default_config();
        self.generate_with_config(prompt, &config).await
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let request = self.chat_request(prompt, config, false);
        let response = self.post_chat(&request).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(Error::LLMProvider(error));
        }

        let text = body
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::LLMProvider(format!(
                "Empty response from Ollama model '{}'",
                config.model_id
            )));
        }

        info!(model = %config.model_id, tokens = ?body.eval_count, "generation complete");

        Ok(GenerationResult {
            text,
            model_id: config.model_id.clone(),
            tokens_used: body.eval_count,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TokenStream> {
        let request = self.chat_request(prompt, config, true);
        let response = self.post_chat(&request).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| Error::Network(e.to_string()))
            })
            .boxed();

        Ok(decode_token_stream(bytes))
    }

    fn model_id(&self) -> &str {
        &self.config.chat_model
    }

    fn default_config(&self) -> GenerationConfig {
        GenerationConfig {
            model_id: self.config.chat_model.clone(),
            temperature: Some(self.config.temperature),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("no embedding returned for query".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.embed_batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }

        debug!(count = vectors.len(), model = %self.config.embedding_model, "embedded passages");
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(parts: Vec<&'static str>) -> BoxStream<'static, Result<Vec<u8>>> {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes().to_vec()))).boxed()
    }

    #[test]
    fn test_parse_stream_line() {
        let event = parse_stream_line(r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, StreamEvent { token: "Hel".to_string(), done: false });

        assert!(parse_stream_line("   ").unwrap().is_none());
        assert!(matches!(
            parse_stream_line(r#"{"error":"model not found"}"#),
            Err(Error::LLMProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_token_stream_across_chunk_boundaries() {
        let bytes = byte_stream(vec![
            "{\"message\":{\"content\":\"The \"},\"done\":false}\n{\"mess",
            "age\":{\"content\":\"answer\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
            "{\"message\":{\"content\":\"ignored\"},\"done\":false}\n",
        ]);

        let tokens: Vec<String> = decode_token_stream(bytes)
            .map(|t| t.unwrap())
            .collect()
            .await;

        assert_eq!(tokens, vec!["The ".to_string(), "answer".to_string()]);
    }

    #[tokio::test]
    async fn test_decode_token_stream_without_trailing_newline() {
        let bytes = byte_stream(vec!["{\"message\":{\"content\":\"last\"},\"done\":true}"]);

        let tokens: Vec<Result<String>> = decode_token_stream(bytes).collect().await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].as_ref().unwrap(), "last");
    }

    #[test]
    fn test_model_present() {
        let names = ["mistral:latest", "all-minilm:l6-v2"];
        assert!(model_present(&names, "mistral"));
        assert!(model_present(&names, "mistral:latest"));
        assert!(model_present(&names, "all-minilm"));
        assert!(!model_present(&names, "mistral-nemo"));
    }

    #[test]
    fn test_check_embedding_count() {
        let vectors = vec![vec![0.1, 0.2], vec![0.3, 0.4]];
        assert_eq!(check_embedding_count(2, vectors.clone()).unwrap(), vectors);

        match check_embedding_count(3, vectors) {
            Err(Error::Embedding(msg)) => assert_eq!(msg, "expected 3 embeddings, received 2"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(check_embedding_count(1, Vec::new()).is_err());
    }

    /// Answer every /api/embed request with one vector per input, tagged by
    /// its position in the overall request sequence
    async fn serve_embeddings(listener: tokio::net::TcpListener, batches: usize) -> Vec<Vec<String>> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut seen = Vec::new();
        let mut offset = 0usize;
        for _ in 0..batches {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let body = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + length {
                        break raw[split + 4..split + 4 + length].to_vec();
                    }
                }
            };

            let request: serde_json::Value = serde_json::from_slice(&body).unwrap();
            let inputs: Vec<String> = request["input"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect();
            let embeddings: Vec<Vec<f32>> = (0..inputs.len()).map(|i| vec![(offset + i) as f32]).collect();
            offset += inputs.len();
            seen.push(inputs);

            let payload = serde_json::json!({ "embeddings": embeddings }).to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        }
        seen
    }

    #[tokio::test]
    async fn test_embed_documents_respects_batch_size() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_embeddings(listener, 3));

        let mut config = OllamaConfig::new("mistral", "all-minilm");
        config.base_url = format!("http://{}", address);
        config.embed_batch_size = 2;
        let client = OllamaClient::new(config).unwrap();

        let texts: Vec<String> = (0..5).map(|i| format!("passage {}", i)).collect();
        let vectors = client.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors, (0..5).map(|i| vec![i as f32]).collect::<Vec<_>>());
        let batches = server.await.unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches.concat(), texts);
    }
}
