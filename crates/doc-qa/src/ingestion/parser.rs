//! Plain-text extraction for uploaded PDF and text files

use sha2::{Digest, Sha256};
use std::panic::{self, UnwindSafe};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::FileType;

/// Extracted document text plus identity
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File type
    pub file_type: FileType,
    /// Extracted text content
    pub content: String,
    /// SHA-256 of the raw upload, hex encoded
    pub content_hash: String,
}

/// Text extraction for the supported upload formats
pub struct FileParser;

impl FileParser {
    /// Parse raw bytes, dispatching on the file name's extension
    pub fn parse(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let file_type = FileType::from_filename(filename)?;
        let content = Self::extract_bytes(data, file_type)
            .map_err(|e| Error::invalid_input(format!("failed to extract '{}': {}", filename, e)))?;

        Ok(ParsedDocument {
            file_type,
            content,
            content_hash: Self::content_hash(data),
        })
    }

    /// Extract plain text from a file on disk
    pub fn extract(path: impl AsRef<Path>, file_type: FileType) -> Result<String> {
        let data = std::fs::read(path.as_ref())?;
        Self::extract_bytes(&data, file_type)
    }

    /// Extract plain text from in-memory bytes
    pub fn extract_bytes(data: &[u8], file_type: FileType) -> Result<String> {
        match file_type {
            FileType::Pdf => Self::extract_pdf(data),
            FileType::Txt => Ok(Self::extract_text(data)),
        }
    }

    fn extract_pdf(data: &[u8]) -> Result<String> {
        let raw = contain_panics("pdf extraction", || {
            pdf_extract::extract_text_from_mem(data)
                .map_err(|e| Error::invalid_input(format!("pdf extraction failed: {}", e)))
        })?;
        Ok(normalize_pdf_text(&raw))
    }

    fn extract_text(data: &[u8]) -> String {
        let text = String::from_utf8_lossy(data);
        text.strip_prefix('\u{FEFF}').unwrap_or(&text).to_string()
    }

    /// Hex SHA-256 of the raw bytes
    pub fn content_hash(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

/// Run a third-party extractor, turning a panic on malformed input into `InvalidInput`
fn contain_panics<T>(what: &str, extract: impl FnOnce() -> Result<T> + UnwindSafe) -> Result<T> {
    match panic::catch_unwind(extract) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!("{} panicked: {}", what, reason);
            Err(Error::invalid_input(format!("{} failed on malformed input: {}", what, reason)))
        }
    }
}

/// Undo typographic ligatures and odd spaces PDF fonts tend to emit
fn normalize_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' => out.push(' '),
            '\u{000C}' => out.push_str("\n\n"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text() {
        let parsed = FileParser::parse("notes.txt", "\u{FEFF}The sky is blue".as_bytes()).unwrap();
        assert_eq!(parsed.file_type, FileType::Txt);
        assert_eq!(parsed.content, "The sky is blue");
        assert_eq!(parsed.content_hash.len(), 64);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            FileParser::parse("deck.pptx", b"PK..."),
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_garbage_pdf_is_invalid_input() {
        assert!(matches!(
            FileParser::parse("broken.pdf", b"not a pdf at all"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_extract_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "line one\nline two").unwrap();
        let text = FileParser::extract(&path, FileType::Txt).unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[test]
    fn test_extractor_panic_is_invalid_input() {
        let result: Result<String> = contain_panics("pdf extraction", || panic!("bad xref table"));
        match result {
            Err(Error::InvalidInput(message)) => assert!(message.contains("bad xref table")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        let ok = contain_panics("pdf extraction", || Ok("text".to_string())).unwrap();
        assert_eq!(ok, "text");
    }

    #[test]
    fn test_normalize_pdf_text() {
        assert_eq!(normalize_pdf_text("\u{FB01}nal\u{00A0}o\u{FB03}ce"), "final office");
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(FileParser::content_hash(b"abc"), FileParser::content_hash(b"abc"));
        assert_ne!(FileParser::content_hash(b"abc"), FileParser::content_hash(b"abd"));
    }
}
