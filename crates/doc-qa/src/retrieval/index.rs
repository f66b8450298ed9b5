//! Vector index: embeds chunks and questions, stores and searches them

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::{with_timeout, EmbeddingProvider, VectorStoreProvider};
use crate::types::{Chunk, IndexedVector};

/// Default number of chunks returned by [`VectorIndex::search`]
pub const DEFAULT_TOP_K: usize = 4;

/// Searchable collection of embedded chunks
///
/// Combines an embedding function with a vector store. Cloning is cheap and
/// clones share the same underlying store.
#[derive(Clone)]
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    timeout: Duration,
}

impl VectorIndex {
    /// Create an index; `timeout` bounds every embedding call
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            timeout,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn VectorStoreProvider> {
        &self.store
    }

    /// Embed and persist a batch; all chunks are added or none are
    pub async fn add(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let entries = self.embed_chunks(chunks).await?;
        let count = entries.len();
        self.store.insert_batch(entries).await?;
        tracing::debug!("Indexed {} chunks via {}", count, self.store.name());
        Ok(())
    }

    /// Atomically replace every chunk of `source_id` with `chunks`
    ///
    /// Returns the number of chunks that were replaced.
    pub async fn replace(&self, source_id: &str, chunks: Vec<Chunk>) -> Result<usize> {
        let entries = self.embed_chunks(chunks).await?;
        self.replace_embedded(source_id, entries).await
    }

    /// Like [`VectorIndex::replace`] for chunks already run through
    /// [`VectorIndex::embed_chunks`]
    pub async fn replace_embedded(&self, source_id: &str, entries: Vec<IndexedVector>) -> Result<usize> {
        self.store.replace_source(source_id, entries).await
    }

    /// Fail when the stored vectors and the embedder disagree on dimension
    ///
    /// An index written with one embedding model cannot be searched with
    /// another, so this runs once at startup rather than on every query.
    pub async fn verify_dimensions(&self) -> Result<()> {
        let expected = self.embedder.dimensions();
        match self.store.dimension().await? {
            Some(stored) if stored != expected => Err(Error::invalid_configuration(format!(
                "vector index holds {}-dimensional embeddings but {} produces {}; \
                 set embeddings.dimensions to match or clear the index",
                stored,
                self.embedder.name(),
                expected
            ))),
            _ => Ok(()),
        }
    }

    /// The `k` chunks closest to `query`, best match first
    ///
    /// Fails with [`Error::IndexEmpty`] when nothing has been indexed.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if self.store.is_empty().await? {
            return Err(Error::IndexEmpty);
        }
        let embedding = with_timeout(self.timeout, "Query embedding", self.embedder.embed(query)).await?;
        self.check_width(&embedding)?;
        let results = self.store.search(&embedding, k).await?;

        tracing::debug!(
            "Retrieved {} chunks (best distance {:?})",
            results.len(),
            results.first().map(|r| r.distance)
        );

        Ok(results.into_iter().map(|r| r.chunk).collect())
    }

    /// Delete all chunks of one source
    pub async fn remove_source(&self, source_id: &str) -> Result<usize> {
        self.store.delete_by_source(source_id).await
    }

    /// Delete every chunk
    pub async fn clear(&self) -> Result<usize> {
        self.store.clear().await
    }

    /// Number of indexed chunks
    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.store.is_empty().await
    }

    /// Embed chunks without storing them
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexedVector>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = with_timeout(
            self.timeout,
            "Chunk embedding",
            self.embedder.embed_batch(&texts),
        )
        .await?;

        if vectors.len() != chunks.len() {
            return Err(Error::model_call(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        for vector in &vectors {
            self.check_width(vector)?;
        }

        Ok(vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexedVector::new(vector, chunk))
            .collect())
    }

    fn check_width(&self, vector: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if vector.len() != expected {
            return Err(Error::model_call(format!(
                "{} returned a {}-dimensional embedding, expected {}",
                self.embedder.name(),
                vector.len(),
                expected
            )));
        }
        Ok(())
    }
}
