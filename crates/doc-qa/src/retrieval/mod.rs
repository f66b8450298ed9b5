//! Embedding-backed retrieval over stored chunks

pub mod index;
pub mod similarity;
pub mod store;

pub use index::VectorIndex;
pub use store::VectorStore;
