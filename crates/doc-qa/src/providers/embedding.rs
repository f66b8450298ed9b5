//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;
use crate::error::Result;

/// Opaque text -> fixed-length vector function
///
/// Implementations:
/// - `OllamaEmbedder`: Local Ollama server (nomic-embed-text)
/// - `OpenAiEmbedder`: OpenAI embeddings API
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimensions, fixed per deployment
    fn dimensions(&self) -> usize;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Provider name for logging
    fn name(&self) -> &str;
}
