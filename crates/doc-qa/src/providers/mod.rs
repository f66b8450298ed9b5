//! Provider abstractions for embeddings, generation, vector storage, and blob storage
//!
//! The core only talks to these traits; concrete backends (Ollama, OpenAI, the
//! local SQLite vector store, the filesystem blob store) are chosen at startup.

pub mod document_store;
pub mod embedding;
mod http;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod vector_store;

pub use document_store::DocumentStoreProvider;
pub use embedding::EmbeddingProvider;
pub use llm::{Generation, LlmProvider};
pub use vector_store::{VectorSearchResult, VectorStoreProvider};

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Bound an outbound model call; an elapsed timer is a `ModelCall` failure
pub async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::model_call(format!("{} timed out after {:?}", what, timeout))),
    }
}
