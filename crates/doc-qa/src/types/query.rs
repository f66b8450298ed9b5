//! Request and response shapes of the exposed interface

use serde::{Deserialize, Serialize};

/// Question posed against the uploaded documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    #[serde(default)]
    pub question: String,

    /// Conversation to continue (default conversation when absent)
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Answer to a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated answer or the graceful fallback text
    pub response: String,
}

/// Result of uploading a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Human-readable status
    pub message: String,
    /// Number of chunks added to the index
    pub chunks_processed: usize,
    /// Source id the chunks were stored under
    pub source_id: String,
}

impl UploadResponse {
    /// Successful upload
    pub fn processed(source_id: impl Into<String>, chunks_processed: usize) -> Self {
        Self {
            message: "File uploaded and processed successfully".to_string(),
            chunks_processed,
            source_id: source_id.into(),
        }
    }
}
