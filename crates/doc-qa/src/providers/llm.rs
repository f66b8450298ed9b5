//! Answer-generation model trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// Normalised model output; every backend reduces its response to this shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Opaque prompt -> text function
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (llama3.2, phi3, etc.)
/// - `OpenAiLlm`: OpenAI chat completions
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for a fully assembled prompt
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model in use
    fn model(&self) -> &str;
}
