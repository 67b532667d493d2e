//! Snapshot tests for the Ollama client

#[cfg(test)]
mod snapshot_tests {
    use crate::{GenerationConfig, LLMProvider, OllamaClient, OllamaConfig};
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_config_snapshot() {
        let config = OllamaConfig::new("mistral", "all-minilm");

        assert_yaml_snapshot!(config, {
            ".temperature" => "[temperature]",
        }, @r###"
        ---
        base_url: "http://localhost:11434"
        chat_model: mistral
        embedding_model: all-minilm
        temperature: "[temperature]"
        request_timeout_secs: 300
        embed_batch_size: 32
        "###);
    }

    #[test]
    fn test_chat_request_snapshot() {
        let client = OllamaClient::new(OllamaConfig::default()).unwrap();
        let config = GenerationConfig {
            model_id: "mistral".to_string(),
            temperature: None,
            max_tokens: Some(256),
            stop_sequences: vec!["Question:".to_string()],
        };

        let request = client.chat_request("What is attention?", &config, true);

        assert_yaml_snapshot!(request, @r###"
        ---
        model: mistral
        messages:
          - role: user
            content: What is attention?
        stream: true
        options:
          num_predict: 256
          stop:
            - "Question:"
        "###);
    }

    #[test]
    fn test_default_generation_config_uses_configured_model() {
        let client = OllamaClient::new(OllamaConfig::default())
            .unwrap()
            .with_model("llama3");

        let config = client.default_config();
        assert_eq!(config.model_id, "llama3");
        assert_eq!(client.model_id(), "llama3");
        assert!(config.temperature.is_some());
    }
}
