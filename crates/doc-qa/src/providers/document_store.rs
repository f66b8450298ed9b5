//! Blob storage for original uploaded files

use async_trait::async_trait;
use bytes::Bytes;
use crate::error::Result;

/// Trait for document storage
///
/// Implementations:
/// - `LocalDocumentStore`: Local filesystem
#[async_trait]
pub trait DocumentStoreProvider: Send + Sync {
    /// Store a document under `key`, replacing any previous object
    ///
    /// Returns the storage URI
    async fn upload(&self, key: &str, data: &[u8]) -> Result<String>;

    /// Retrieve document bytes, `None` when the key is unknown
    async fn download(&self, key: &str) -> Result<Option<Bytes>>;

    /// Check if document exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a document, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
