//! Chunk and indexed-vector types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Supported upload file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" => Ok(Self::Txt),
            other => Err(Error::UnsupportedFileType(other.to_string())),
        }
    }

    /// Detect file type from a file name or path
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::UnsupportedFileType(filename.to_string()))?;
        Self::from_extension(ext)
    }

    /// Lowercase name used in metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
        }
    }
}

/// A bounded, contiguous slice of a source document's text
///
/// Immutable once created. `char_start`/`char_end` are offsets in characters
/// into the extracted document text, so consecutive chunks of one source can be
/// stitched back together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text
    pub text: String,
    /// Document the chunk came from (the uploaded file name)
    pub source_id: String,
    /// Zero-based position within the document
    pub sequence_index: u32,
    /// Start offset (chars, inclusive)
    pub char_start: usize,
    /// End offset (chars, exclusive)
    pub char_end: usize,
    /// Free-form string metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        sequence_index: u32,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            sequence_index,
            char_start,
            char_end,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// An embedded chunk as persisted in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    /// Unique entry id
    pub id: String,
    /// Embedding of `chunk.text`
    pub vector: Vec<f32>,
    /// The chunk itself
    pub chunk: Chunk,
}

impl IndexedVector {
    /// Create an entry with a fresh id
    pub fn new(vector: Vec<f32>, chunk: Chunk) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            chunk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_filename("report.PDF").unwrap(), FileType::Pdf);
        assert_eq!(FileType::from_filename("notes.txt").unwrap(), FileType::Txt);
        assert!(matches!(
            FileType::from_filename("slides.pptx"),
            Err(Error::UnsupportedFileType(_))
        ));
        assert!(matches!(
            FileType::from_filename("README"),
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_chunk_metadata() {
        let chunk = Chunk::new("notes.txt", "The sky is blue", 0, 0, 15)
            .with_metadata("file_type", "txt");
        assert_eq!(chunk.char_len(), 15);
        assert_eq!(chunk.metadata.get("file_type").map(String::as_str), Some("txt"));
    }
}
