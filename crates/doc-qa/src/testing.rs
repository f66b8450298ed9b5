//! Deterministic in-process providers for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::local::LocalVectorStore;
use crate::providers::{EmbeddingProvider, Generation, LlmProvider};
use crate::retrieval::{VectorIndex, VectorStore};

/// Bag-of-words hashing embedder; identical texts embed identically
pub struct StubEmbedder {
    dimensions: usize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dimensions];
        let mut any = false;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
            any = true;
        }
        if !any {
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Embedder that always fails
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::model_call("embedding backend unavailable"))
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Returns the prompt it was given and records every call
#[derive(Default)]
pub struct EchoLlm {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmProvider for EchoLlm {
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<Generation> {
        self.prompts.lock().push(prompt.to_string());
        Ok(Generation::new(format!("  {}  ", prompt)))
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo"
    }
}

/// Always fails like a quota or transport error
pub struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<Generation> {
        Err(Error::model_call("quota exceeded"))
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Answers after a fixed delay
pub struct SlowLlm {
    pub delay: Duration,
}

#[async_trait]
impl LlmProvider for SlowLlm {
    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<Generation> {
        tokio::time::sleep(self.delay).await;
        Ok(Generation::new("too late"))
    }

    fn name(&self) -> &str {
        "slow"
    }

    fn model(&self) -> &str {
        "slow"
    }
}

/// In-memory index over a [`StubEmbedder`]
pub fn memory_index() -> VectorIndex {
    index_with(Arc::new(StubEmbedder::new(64)))
}

/// In-memory index over the given embedder
pub fn index_with(embedder: Arc<dyn EmbeddingProvider>) -> VectorIndex {
    let store = VectorStore::in_memory().expect("in-memory store");
    VectorIndex::new(
        embedder,
        Arc::new(LocalVectorStore::new(Arc::new(store))),
        Duration::from_secs(5),
    )
}
