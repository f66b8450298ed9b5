//! Ollama-backed embedding and generation providers

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::http::{build_client, check_status, retry_request};
use super::llm::{Generation, LlmProvider};

/// Ollama API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            config: config.clone(),
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Generate an embedding
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);

        retry_request(self.config.max_retries, || async {
            let request = EmbedRequest {
                model: &self.config.embed_model,
                prompt: text,
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::model_call(format!("Embedding request failed: {}", e)))?;
            let response = check_status(response, "Embedding").await?;

            let embed_response: EmbedResponse = response
                .json()
                .await
                .map_err(|e| Error::model_call(format!("Failed to parse embedding response: {}", e)))?;

            Ok(embed_response.embedding)
        })
        .await
    }

    /// Complete a prompt
    pub async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);

        tracing::debug!("Generating with model: {}", self.config.generate_model);

        retry_request(self.config.max_retries, || async {
            let request = GenerateRequest {
                model: &self.config.generate_model,
                prompt,
                stream: false,
                options: GenerateOptions { temperature },
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::model_call(format!("Generation request failed: {}", e)))?;
            let response = check_status(response, "Generation").await?;

            let generate_response: GenerateResponse = response
                .json()
                .await
                .map_err(|e| Error::model_call(format!("Failed to parse generation response: {}", e)))?;

            Ok(generate_response.response)
        })
        .await
    }
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &LlmConfig, dimensions: usize) -> Result<Self> {
        Ok(Self::from_client(Arc::new(OllamaClient::new(config)?), dimensions))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, dimensions: usize) -> Self {
        Self { client, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for answer generation
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(
            Arc::new(OllamaClient::new(config)?),
            config.generate_model.clone(),
        ))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation> {
        self.client.generate(prompt, temperature).await.map(Generation::new)
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embedder and LLM sharing one Ollama client
pub fn ollama_providers(config: &LlmConfig, dimensions: usize) -> Result<(OllamaEmbedder, OllamaLlm)> {
    let client = Arc::new(OllamaClient::new(config)?);
    Ok((
        OllamaEmbedder::from_client(Arc::clone(&client), dimensions),
        OllamaLlm::from_client(client, config.generate_model.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_shape() {
        let request = GenerateRequest {
            model: "llama3.2:3b",
            prompt: "hi",
            stream: false,
            options: GenerateOptions { temperature: 0.7 },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3.2:3b");
        assert_eq!(value["stream"], false);
        assert!(value["options"]["temperature"].is_number());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_model_call_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let llm = OllamaLlm::new(&config).unwrap();
        assert!(matches!(
            llm.generate("hello", 0.0).await,
            Err(Error::ModelCall(_))
        ));
        assert!(!llm.health_check().await.unwrap());
    }
}
