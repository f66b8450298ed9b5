//! Local provider implementations using SQLite and the filesystem

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::retrieval::VectorStore;
use crate::types::IndexedVector;

use super::document_store::DocumentStoreProvider;
use super::vector_store::{VectorSearchResult, VectorStoreProvider};

/// Local vector store wrapping the SQLite-backed [`VectorStore`]
pub struct LocalVectorStore {
    store: Arc<VectorStore>,
}

impl LocalVectorStore {
    /// Create from existing VectorStore
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }

    /// Create from config
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let store = Arc::new(VectorStore::open(&config.vector_db.storage_path)?);
        Ok(Self { store })
    }

    /// Get underlying store for direct access
    pub fn inner(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Run a synchronous store operation on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&VectorStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl VectorStoreProvider for LocalVectorStore {
    async fn insert_batch(&self, entries: Vec<IndexedVector>) -> Result<()> {
        self.blocking(move |store| store.insert_batch(entries)).await
    }

    async fn replace_source(&self, source_id: &str, entries: Vec<IndexedVector>) -> Result<usize> {
        let source_id = source_id.to_string();
        self.blocking(move |store| store.replace_source(&source_id, entries))
            .await
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>> {
        let query = query_embedding.to_vec();
        self.blocking(move |store| store.search(&query, top_k)).await
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let source_id = source_id.to_string();
        self.blocking(move |store| store.delete_by_source(&source_id))
            .await
    }

    async fn clear(&self) -> Result<usize> {
        self.blocking(|store| store.clear()).await
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.store.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.store.dimension())
    }

    fn name(&self) -> &str {
        "local-sqlite"
    }
}

/// Local document store using filesystem
pub struct LocalDocumentStore {
    /// Directory to store documents
    storage_dir: PathBuf,
}

impl LocalDocumentStore {
    /// Create a new local document store
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    /// Get path for a document; keys are reduced to a single path component
    fn doc_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.storage_dir.join(sanitize_key(key)?))
    }
}

/// Strip any directory part so a key cannot escape the storage directory
fn sanitize_key(key: &str) -> Result<String> {
    let name = key
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::invalid_input(format!("invalid document key '{}'", key)));
    }
    Ok(name.to_string())
}

#[async_trait]
impl DocumentStoreProvider for LocalDocumentStore {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<String> {
        let doc_path = self.doc_path(key)?;
        tokio::fs::write(&doc_path, data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", doc_path.display(), e)))?;

        Ok(doc_path.to_string_lossy().to_string())
    }

    async fn download(&self, key: &str) -> Result<Option<Bytes>> {
        let doc_path = self.doc_path(key)?;
        match tokio::fs::read(&doc_path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let doc_path = self.doc_path(key)?;
        Ok(tokio::fs::try_exists(&doc_path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let doc_path = self.doc_path(key)?;
        match tokio::fs::remove_file(&doc_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Storage(format!("Failed to delete {}: {}", key, e))),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.storage_dir.exists())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}
