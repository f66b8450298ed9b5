//! Error types for the document Q&A service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for doc-qa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Document Q&A errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing question or file
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File extension outside the supported set
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// A batch could not be written to the vector index; prior state is intact
    #[error("Index write failed: {0}")]
    IndexWrite(String),

    /// Search against an index with no entries
    #[error("Vector index is empty")]
    IndexEmpty,

    /// Embedding or generation call failed (transport, timeout, quota)
    #[error("Model call failed: {0}")]
    ModelCall(String),

    /// Chunker or service parameters are invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Blob storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an index write error
    pub fn index_write(message: impl Into<String>) -> Self {
        Self::IndexWrite(message.into())
    }

    /// Create a model call error
    pub fn model_call(message: impl Into<String>) -> Self {
        Self::ModelCall(message.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Errors the conversational surface absorbs instead of propagating
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::IndexEmpty | Self::ModelCall(_) | Self::Http(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Error::UnsupportedFileType(_) => (StatusCode::BAD_REQUEST, "unsupported_type"),
            Error::InvalidConfiguration(_) => (StatusCode::BAD_REQUEST, "invalid_configuration"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::ModelCall(_) => (StatusCode::SERVICE_UNAVAILABLE, "model_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, "json_error"),
            Error::IndexWrite(_) => (StatusCode::INTERNAL_SERVER_ERROR, "index_write_error"),
            Error::IndexEmpty => (StatusCode::INTERNAL_SERVER_ERROR, "index_empty"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = Error::invalid_input("missing question").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = Error::UnsupportedFileType("docx".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = Error::NotFound("report.pdf".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = Error::index_write("disk full").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // only raised for stored metadata, so it is a server fault
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let resp = Error::from(json_error).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::IndexEmpty.is_recoverable());
        assert!(Error::model_call("timeout").is_recoverable());
        assert!(!Error::invalid_input("empty").is_recoverable());
        assert!(!Error::index_write("boom").is_recoverable());
    }
}
