//! Application state for the document Q&A server

use std::sync::Arc;

use crate::config::{LlmBackend, RagConfig};
use crate::conversation::SessionRegistry;
use crate::engine::{EngineSettings, QueryEngine};
use crate::error::{Error, Result};
use crate::ingestion::{IngestPipeline, TextChunker};
use crate::providers::{
    local::{LocalDocumentStore, LocalVectorStore},
    ollama::ollama_providers,
    openai::openai_providers,
    DocumentStoreProvider, EmbeddingProvider, LlmProvider, VectorStoreProvider,
};
use crate::retrieval::VectorIndex;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Question answering over the index
    engine: QueryEngine,
    /// Upload pipeline writing into the same index
    pipeline: IngestPipeline,
    /// Conversations by session id
    sessions: SessionRegistry,
}

impl AppState {
    /// Create new application state from configuration
    pub async fn new(config: RagConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing application state (backend: {:?})...", config.llm.backend);

        let (embedder, llm): (Arc<dyn EmbeddingProvider>, Arc<dyn LlmProvider>) = match config.llm.backend {
            LlmBackend::Ollama => {
                let (embedder, llm) = ollama_providers(&config.llm, config.embeddings.dimensions)?;
                (Arc::new(embedder), Arc::new(llm))
            }
            LlmBackend::OpenAi => {
                let (embedder, llm) = openai_providers(&config.llm, config.embeddings.dimensions)?;
                (Arc::new(embedder), Arc::new(llm))
            }
        };
        tracing::info!(
            "Model providers initialized ({} embeddings with {}, {} generation with {})",
            embedder.name(),
            config.llm.embed_model,
            llm.name(),
            llm.model()
        );

        let config_for_store = config.clone();
        let vector_store = tokio::task::spawn_blocking(move || LocalVectorStore::from_config(&config_for_store))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;
        tracing::info!("Vector store opened at {}", config.vector_db.storage_path.display());

        let documents = LocalDocumentStore::new(config.storage.documents_dir.clone())?;
        tracing::info!("Document store at {}", config.storage.documents_dir.display());

        let state = Self::from_parts(config, embedder, llm, Arc::new(vector_store), Arc::new(documents))?;
        state.index().verify_dimensions().await?;
        Ok(state)
    }

    /// Assemble state from already constructed providers
    pub fn from_parts(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        vector_store: Arc<dyn VectorStoreProvider>,
        documents: Arc<dyn DocumentStoreProvider>,
    ) -> Result<Self> {
        let chunker = TextChunker::from_config(&config.chunking)?;
        let index = VectorIndex::new(embedder, vector_store, config.llm.timeout());
        let engine = QueryEngine::new(index.clone(), llm, EngineSettings::from_config(&config));
        let pipeline = IngestPipeline::new(chunker, index, documents);
        let sessions = SessionRegistry::with_default(Arc::clone(engine.conversation()))
            .with_limits(config.sessions.max_sessions, config.sessions.idle_timeout());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                engine,
                pipeline,
                sessions,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Get query engine
    pub fn engine(&self) -> &QueryEngine {
        &self.inner.engine
    }

    /// Get upload pipeline
    pub fn pipeline(&self) -> &IngestPipeline {
        &self.inner.pipeline
    }

    /// Get session registry
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Get the shared vector index
    pub fn index(&self) -> &VectorIndex {
        self.inner.engine.index()
    }

    /// Get document store
    pub fn documents(&self) -> &Arc<dyn DocumentStoreProvider> {
        self.inner.pipeline.documents()
    }
}
