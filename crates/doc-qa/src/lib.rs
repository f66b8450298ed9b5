//! doc-qa: document question answering with retrieval-augmented generation
//!
//! Uploaded documents are extracted, split into overlapping chunks, embedded and
//! stored in a persistent vector index. Questions are answered by retrieving the
//! closest chunks, folding them into a grounded prompt together with the recent
//! conversation, and asking an answer-generation model.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RagConfig;
pub use conversation::{ConversationState, SessionRegistry};
pub use engine::QueryEngine;
pub use error::{Error, Result};
pub use ingestion::{IngestPipeline, TextChunker};
pub use retrieval::VectorIndex;
pub use types::{
    document::{Chunk, FileType, IndexedVector},
    query::{QueryRequest, QueryResponse, UploadResponse},
};
