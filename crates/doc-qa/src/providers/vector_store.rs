//! Vector store provider trait for persisting and scanning embedded chunks

use async_trait::async_trait;
use crate::error::Result;
use crate::types::{Chunk, IndexedVector};

/// Search hit from a vector store
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    /// The matched chunk
    pub chunk: Chunk,
    /// Cosine distance to the query (0.0 identical, 2.0 opposite)
    pub distance: f32,
}

/// Storage and nearest-neighbour search over embedded chunks
///
/// Batch writes are all-or-nothing. Readers never observe a partially applied
/// batch. Results are ordered by ascending distance, then `sequence_index`,
/// then insertion order.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Persist a batch atomically
    async fn insert_batch(&self, entries: Vec<IndexedVector>) -> Result<()>;

    /// Atomically drop every entry of `source_id` and insert `entries`
    ///
    /// Returns the number of entries removed.
    async fn replace_source(&self, source_id: &str, entries: Vec<IndexedVector>) -> Result<usize>;

    /// The `top_k` entries closest to `query_embedding`
    ///
    /// Fails with `Error::IndexEmpty` when nothing is stored.
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>>;

    /// Delete all entries of one source document
    async fn delete_by_source(&self, source_id: &str) -> Result<usize>;

    /// Delete everything
    async fn clear(&self) -> Result<usize>;

    /// Number of stored entries
    async fn len(&self) -> Result<usize>;

    /// Embedding dimension fixed by the stored vectors, `None` while empty
    async fn dimension(&self) -> Result<Option<usize>>;

    /// Check if store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Provider name for logging
    fn name(&self) -> &str;
}
