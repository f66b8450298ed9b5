//! Core types for the document Q&A service

pub mod document;
pub mod query;

pub use document::{Chunk, FileType, IndexedVector};
pub use query::{QueryRequest, QueryResponse, UploadResponse};
