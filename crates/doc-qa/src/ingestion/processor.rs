//! Upload pipeline orchestration

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::DocumentStoreProvider;
use crate::retrieval::VectorIndex;
use crate::types::{Chunk, FileType, UploadResponse};

use super::chunker::TextChunker;
use super::parser::{FileParser, ParsedDocument};

/// Validates, extracts, chunks, stores and indexes uploaded files
#[derive(Clone)]
pub struct IngestPipeline {
    chunker: TextChunker,
    index: VectorIndex,
    documents: Arc<dyn DocumentStoreProvider>,
}

impl IngestPipeline {
    pub fn new(chunker: TextChunker, index: VectorIndex, documents: Arc<dyn DocumentStoreProvider>) -> Self {
        Self {
            chunker,
            index,
            documents,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStoreProvider> {
        &self.documents
    }

    /// Full upload: validate, extract, chunk, store the original, then index
    ///
    /// Re-uploading a file name replaces that file's chunks.
    pub async fn upload(&self, filename: &str, data: Vec<u8>) -> Result<UploadResponse> {
        let source_id = source_id(filename)?;
        // reject before doing any extraction work
        FileType::from_filename(&source_id)?;

        tracing::info!("Processing upload: {} ({} bytes)", source_id, data.len());

        let pipeline = self.clone();
        let name = source_id.clone();
        let (data, chunks) = tokio::task::spawn_blocking(move || {
            let parsed = FileParser::parse(&name, &data)?;
            let chunks = pipeline.create_chunks(&name, &parsed);
            Ok::<_, Error>((data, chunks))
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

        // embed before touching either store so a model failure changes nothing
        let entries = self.index.embed_chunks(chunks).await?;
        let count = entries.len();

        let previous = self.documents.download(&source_id).await?;
        let uri = self.documents.upload(&source_id, &data).await?;
        tracing::debug!("Stored original at {} via {}", uri, self.documents.name());

        let replaced = match self.index.replace_embedded(&source_id, entries).await {
            Ok(replaced) => replaced,
            Err(e) => {
                tracing::warn!("Indexing {} failed, restoring stored original: {}", source_id, e);
                self.restore_original(&source_id, previous).await;
                return Err(e);
            }
        };
        if replaced > 0 {
            tracing::info!("Replaced {} previous chunks of {}", replaced, source_id);
        }

        tracing::info!("Indexed {} chunks from {}", count, source_id);
        Ok(UploadResponse::processed(source_id, count))
    }

    /// Put the blob store back to what it held before a failed upload
    async fn restore_original(&self, source_id: &str, previous: Option<Bytes>) {
        let restored = match previous {
            Some(bytes) => self.documents.upload(source_id, &bytes).await.map(|_| ()),
            None => self.documents.delete(source_id).await.map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::error!("Failed to restore stored original of {}: {}", source_id, e);
        }
    }

    /// Drop a document's chunks and stored original
    pub async fn remove(&self, filename: &str) -> Result<usize> {
        let source_id = source_id(filename)?;
        let removed = self.index.remove_source(&source_id).await?;
        self.documents.delete(&source_id).await?;
        Ok(removed)
    }

    fn create_chunks(&self, source_id: &str, parsed: &ParsedDocument) -> Vec<Chunk> {
        let ingested_at = Utc::now().to_rfc3339();
        self.chunker
            .split(&parsed.content, source_id)
            .into_iter()
            .map(|chunk| {
                chunk
                    .with_metadata("filename", source_id)
                    .with_metadata("file_type", parsed.file_type.as_str())
                    .with_metadata("content_hash", parsed.content_hash.as_str())
                    .with_metadata("ingested_at", ingested_at.as_str())
            })
            .collect()
    }
}

/// The file name without any directory part
fn source_id(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() {
        return Err(Error::invalid_input("No file selected"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::local::LocalDocumentStore;
    use crate::testing::{memory_index, FailingEmbedder, StubEmbedder};
    use std::time::Duration;

    fn pipeline(dir: &std::path::Path) -> IngestPipeline {
        IngestPipeline::new(
            TextChunker::new(100, 20).unwrap(),
            memory_index(),
            Arc::new(LocalDocumentStore::new(dir.join("documents")).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_upload_text() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let text = "The sky is blue. ".repeat(20);

        let response = pipeline.upload("notes.txt", text.clone().into_bytes()).await.unwrap();
        assert_eq!(response.message, "File uploaded and processed successfully");
        assert_eq!(response.source_id, "notes.txt");
        assert!(response.chunks_processed > 1);
        assert_eq!(pipeline.index().len().await.unwrap(), response.chunks_processed);

        let stored = pipeline.documents().download("notes.txt").await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), text.as_bytes());

        let hits = pipeline.index().search("The sky is blue.", 1).await.unwrap();
        assert_eq!(hits[0].metadata.get("file_type").map(String::as_str), Some("txt"));
        assert_eq!(hits[0].metadata.get("filename").map(String::as_str), Some("notes.txt"));
        assert_eq!(hits[0].metadata.get("content_hash").map(String::len), Some(64));
        assert!(hits[0].metadata.contains_key("ingested_at"));
    }

    #[tokio::test]
    async fn test_reupload_replaces_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .upload("notes.txt", "word ".repeat(100).into_bytes())
            .await
            .unwrap();
        let second = pipeline
            .upload("notes.txt", b"Short replacement.".to_vec())
            .await
            .unwrap();

        assert_eq!(second.chunks_processed, 1);
        assert_eq!(pipeline.index().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        assert!(matches!(
            pipeline.upload("", b"data".to_vec()).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline.upload("slides.pptx", b"data".to_vec()).await,
            Err(Error::UnsupportedFileType(_))
        ));
        assert!(!pipeline.documents().exists("slides.pptx").await.unwrap());
        assert!(pipeline.index().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_default_chunking_of_plain_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestPipeline::new(
            TextChunker::default(),
            memory_index(),
            Arc::new(LocalDocumentStore::new(dir.path().join("documents")).unwrap()),
        );

        let response = pipeline
            .upload("upload.txt", "A".repeat(1500).into_bytes())
            .await
            .unwrap();
        assert_eq!(response.chunks_processed, 2);
        assert_eq!(response.message, "File uploaded and processed successfully");
    }

    #[tokio::test]
    async fn test_failed_reupload_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline
            .upload("notes.txt", b"The sky is blue.".to_vec())
            .await
            .unwrap();

        let broken = IngestPipeline::new(
            TextChunker::new(100, 20).unwrap(),
            VectorIndex::new(
                Arc::new(FailingEmbedder),
                Arc::clone(pipeline.index().store()),
                Duration::from_secs(1),
            ),
            Arc::clone(pipeline.documents()),
        );
        let result = broken
            .upload("notes.txt", b"The grass is green.".to_vec())
            .await;

        assert!(matches!(result, Err(Error::ModelCall(_))));
        let stored = pipeline.documents().download("notes.txt").await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), b"The sky is blue.");
        assert_eq!(pipeline.index().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_index_write_restores_blob() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline
            .upload("notes.txt", b"The sky is blue.".to_vec())
            .await
            .unwrap();
        pipeline
            .upload("other.txt", b"The sea is deep.".to_vec())
            .await
            .unwrap();

        // embeds fine, but the store keeps the width of the first model
        let narrower = IngestPipeline::new(
            TextChunker::new(100, 20).unwrap(),
            VectorIndex::new(
                Arc::new(StubEmbedder::new(16)),
                Arc::clone(pipeline.index().store()),
                Duration::from_secs(1),
            ),
            Arc::clone(pipeline.documents()),
        );

        let result = narrower
            .upload("notes.txt", b"The grass is green.".to_vec())
            .await;
        assert!(matches!(result, Err(Error::IndexWrite(_))));
        let stored = pipeline.documents().download("notes.txt").await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), b"The sky is blue.");

        let result = narrower.upload("fresh.txt", b"Brand new.".to_vec()).await;
        assert!(matches!(result, Err(Error::IndexWrite(_))));
        assert!(!pipeline.documents().exists("fresh.txt").await.unwrap());
        assert_eq!(pipeline.index().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.upload("a.txt", b"alpha beta".to_vec()).await.unwrap();

        assert_eq!(pipeline.remove("a.txt").await.unwrap(), 1);
        assert!(pipeline.index().is_empty().await.unwrap());
        assert!(!pipeline.documents().exists("a.txt").await.unwrap());
    }

    #[test]
    fn test_source_id_strips_directories() {
        assert_eq!(source_id("/tmp/upload/report.pdf").unwrap(), "report.pdf");
        assert!(source_id("  ").is_err());
    }
}
