//! Document ingestion: text extraction, chunking, and the upload pipeline

pub mod chunker;
pub mod parser;
pub mod processor;

pub use chunker::TextChunker;
pub use parser::{FileParser, ParsedDocument};
pub use processor::IngestPipeline;
