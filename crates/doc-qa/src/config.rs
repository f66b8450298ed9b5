//! Configuration for the document Q&A service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV_VAR: &str = "DOC_QA_CONFIG";

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval and prompt budgeting
    pub retrieval: RetrievalConfig,
    /// Answer-generation / embedding backend
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Vector database configuration
    pub vector_db: VectorDbConfig,
    /// Blob storage for uploaded originals
    pub storage: StorageConfig,
    /// Named conversation limits
    pub sessions: SessionConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: RagConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, the `DOC_QA_CONFIG` variable, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Reject parameter combinations the core cannot honour
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.retrieval.top_k == 0 {
            return Err(Error::invalid_configuration("retrieval.top_k must be at least 1"));
        }
        if self.retrieval.max_context_chars == 0 {
            return Err(Error::invalid_configuration(
                "retrieval.max_context_chars must be at least 1",
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::invalid_configuration("llm.timeout_secs must be at least 1"));
        }
        if self.sessions.max_sessions == 0 {
            return Err(Error::invalid_configuration("sessions.max_sessions must be at least 1"));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::invalid_configuration("embeddings.dimensions must be at least 1"));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// How far back from a hard cut to look for a paragraph/sentence/word break
    pub boundary_lookback: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            boundary_lookback: 200,
        }
    }
}

impl ChunkingConfig {
    /// `0 <= overlap < chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_configuration("chunk_size must be at least 1"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::invalid_configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Retrieval and prompt budgeting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Character budget for the context block
    pub max_context_chars: usize,
    /// Most recent conversation turns included in the prompt
    pub max_history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_chars: 6000,
            max_history_turns: 6,
        }
    }
}

/// Which model backend serves embeddings and generation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI HTTP API (key from `OPENAI_API_KEY`)
    OpenAi,
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend selection
    pub backend: LlmBackend,
    /// Ollama base URL
    pub base_url: String,
    /// OpenAI base URL
    pub openai_base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Per-call timeout in seconds for embedding and generation
    pub timeout_secs: u64,
    /// Client-side retries for failed HTTP requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "llama3.2:3b".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 0,
        }
    }
}

impl LlmConfig {
    /// Outbound call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding dimensions (768 for nomic-embed-text, 1536 for text-embedding-3-small)
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 768 }
    }
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// SQLite file holding the index
    pub storage_path: PathBuf,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            storage_path: data_dir().join("vectors.sqlite3"),
        }
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving uploaded originals
    pub documents_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            documents_dir: data_dir().join("documents"),
        }
    }
}

/// Named conversation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Most named sessions kept at once
    pub max_sessions: usize,
    /// Seconds a named session may sit unused before it is forgotten
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            idle_timeout_secs: 3600,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        let max_secs = (i64::MAX / 1000) as u64;
        chrono::Duration::seconds(self.idle_timeout_secs.min(max_secs) as i64)
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doc-qa")
}
