//! OpenAI-backed embedding and generation providers

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{LlmConfig, OPENAI_API_KEY_ENV_VAR};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::http::{build_client, check_status, retry_request};
use super::llm::{Generation, LlmProvider};

/// Minimal OpenAI HTTP client (chat completions and embeddings)
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Create a client with an explicit API key
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::invalid_configuration("OpenAI API key is empty"));
        }
        Ok(Self {
            client: build_client(config.timeout())?,
            config: config.clone(),
            api_key,
        })
    }

    /// Create a client reading the key from `OPENAI_API_KEY`
    pub fn from_env(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV_VAR).map_err(|_| {
            Error::invalid_configuration(format!(
                "{} must be set for the openai backend",
                OPENAI_API_KEY_ENV_VAR
            ))
        })?;
        Self::new(config, api_key)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.openai_base_url.trim_end_matches('/'), path)
    }

    /// Check if the API is reachable with this key
    pub async fn health_check(&self) -> Result<bool> {
        match self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Complete a prompt as a single user message
    pub async fn chat(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = self.endpoint("chat/completions");

        retry_request(self.config.max_retries, || async {
            let request = ChatRequest {
                model: &self.config.generate_model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature,
            };

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::model_call(format!("Chat request failed: {}", e)))?;
            let response = check_status(response, "Chat completion").await?;

            let chat: ChatResponse = response
                .json()
                .await
                .map_err(|e| Error::model_call(format!("Failed to parse chat response: {}", e)))?;

            first_choice_text(chat)
        })
        .await
    }

    /// Embed several texts in one request, returned in input order
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint("embeddings");

        retry_request(self.config.max_retries, || async {
            let request = EmbeddingsRequest {
                model: &self.config.embed_model,
                input: texts,
            };

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::model_call(format!("Embedding request failed: {}", e)))?;
            let response = check_status(response, "Embedding").await?;

            let parsed: EmbeddingsResponse = response
                .json()
                .await
                .map_err(|e| Error::model_call(format!("Failed to parse embedding response: {}", e)))?;

            ordered_embeddings(parsed, texts.len())
        })
        .await
    }
}

fn first_choice_text(chat: ChatResponse) -> Result<String> {
    chat.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::model_call("Chat completion returned no content"))
}

fn ordered_embeddings(mut parsed: EmbeddingsResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if parsed.data.len() != expected {
        return Err(Error::model_call(format!(
            "Expected {} embeddings, got {}",
            expected,
            parsed.data.len()
        )));
    }
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

/// OpenAI embeddings provider (text-embedding-3-small or similar)
pub struct OpenAiEmbedder {
    client: Arc<OpenAiClient>,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn from_client(client: Arc<OpenAiClient>, dimensions: usize) -> Self {
        Self { client, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.client.embed_many(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| Error::model_call("Embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed_many(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// OpenAI chat-completions provider
pub struct OpenAiLlm {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiLlm {
    pub fn from_client(client: Arc<OpenAiClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlm {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation> {
        self.client.chat(prompt, temperature).await.map(Generation::new)
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embedder and LLM sharing one OpenAI client, key from the environment
pub fn openai_providers(config: &LlmConfig, dimensions: usize) -> Result<(OpenAiEmbedder, OpenAiLlm)> {
    let client = Arc::new(OpenAiClient::from_env(config)?);
    Ok((
        OpenAiEmbedder::from_client(Arc::clone(&client), dimensions),
        OpenAiLlm::from_client(client, config.generate_model.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            OpenAiClient::new(&LlmConfig::default(), "  "),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let config = LlmConfig {
            openai_base_url: "https://api.openai.com/".to_string(),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(&config, "sk-test").unwrap();
        assert_eq!(
            client.endpoint("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_chat_response_normalised() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"The sky is blue."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(chat).unwrap(), "The sky is blue.");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_choice_text(empty), Err(Error::ModelCall(_))));
    }

    #[test]
    fn test_embeddings_reordered_by_index() {
        let parsed: EmbeddingsResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let embeddings = ordered_embeddings(parsed, 2).unwrap();
        assert_eq!(embeddings[0], vec![1.0, 0.0]);
        assert_eq!(embeddings[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_embedding_count_mismatch() {
        let parsed: EmbeddingsResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#).unwrap();
        assert!(matches!(ordered_embeddings(parsed, 3), Err(Error::ModelCall(_))));
    }
}
