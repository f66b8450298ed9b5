//! Overlapping, boundary-aware text chunking

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::Chunk;

/// Text chunker with configurable size and overlap
///
/// Windows are at most `chunk_size` characters. Each window after the first
/// starts `overlap` characters before the previous one ended. Before making a
/// hard cut the chunker looks back up to `lookback` characters for a paragraph
/// break, then a sentence boundary, then whitespace.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between chunks
    overlap: usize,
    /// Backwards search window for a natural break
    lookback: usize,
}

impl TextChunker {
    /// Create a new chunker; fails unless `overlap < chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::invalid_configuration(format!(
                "chunker requires 0 <= overlap < chunk_size (got chunk_size={}, overlap={})",
                chunk_size, overlap
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            lookback: overlap.max(1),
        })
    }

    /// Create from config
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?.with_lookback(config.boundary_lookback))
    }

    /// Set the boundary lookback window (0 disables boundary search)
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered, overlapping chunks
    pub fn split(&self, text: &str, source_id: &str) -> Vec<Chunk> {
        let layout = TextLayout::new(text);
        let total = layout.len();
        let mut chunks = Vec::new();

        if total == 0 {
            return chunks;
        }

        let mut start = 0usize;
        let mut sequence_index = 0u32;

        loop {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end == total {
                total
            } else {
                self.find_cut(&layout, start, hard_end)
            };

            chunks.push(Chunk::new(
                source_id,
                layout.slice(start, end),
                sequence_index,
                start,
                end,
            ));

            if end == total {
                break;
            }

            sequence_index += 1;
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }

    /// Pick the end of a non-final window
    ///
    /// Cuts are only accepted past `start + overlap` so the next window always
    /// advances.
    fn find_cut(&self, layout: &TextLayout<'_>, start: usize, hard_end: usize) -> usize {
        let lo = hard_end
            .saturating_sub(self.lookback)
            .max(start + self.overlap + 1);
        if self.lookback == 0 || lo > hard_end {
            return hard_end;
        }

        layout
            .last_paragraph_break(lo, hard_end)
            .or_else(|| layout.last_sentence_start(lo, hard_end))
            .or_else(|| layout.last_word_break(lo, hard_end))
            .unwrap_or(hard_end)
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            lookback: 200,
        }
    }
}

/// Character-indexed view of a document with precomputed sentence starts
struct TextLayout<'a> {
    text: &'a str,
    chars: Vec<char>,
    /// Byte offset of every char, plus `text.len()` at the end
    byte_offsets: Vec<usize>,
    /// Char positions where a sentence begins, ascending
    sentence_starts: Vec<usize>,
}

impl<'a> TextLayout<'a> {
    fn new(text: &'a str) -> Self {
        let mut chars = Vec::new();
        let mut byte_offsets = Vec::new();
        for (offset, ch) in text.char_indices() {
            byte_offsets.push(offset);
            chars.push(ch);
        }
        byte_offsets.push(text.len());

        let sentence_starts = text
            .split_sentence_bound_indices()
            .filter_map(|(offset, _)| byte_offsets.binary_search(&offset).ok())
            .collect();

        Self {
            text,
            chars,
            byte_offsets,
            sentence_starts,
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.byte_offsets[start]..self.byte_offsets[end]]
    }

    /// Latest position in `[lo, hi]` directly after a blank line
    fn last_paragraph_break(&self, lo: usize, hi: usize) -> Option<usize> {
        (lo.max(2)..=hi)
            .rev()
            .find(|&p| self.chars[p - 1] == '\n' && self.chars[p - 2] == '\n')
    }

    /// Latest sentence start in `[lo, hi]`
    fn last_sentence_start(&self, lo: usize, hi: usize) -> Option<usize> {
        let upto = self.sentence_starts.partition_point(|&p| p <= hi);
        self.sentence_starts[..upto]
            .last()
            .copied()
            .filter(|&p| p >= lo)
    }

    /// Latest position in `[lo, hi]` directly after whitespace
    fn last_word_break(&self, lo: usize, hi: usize) -> Option<usize> {
        (lo.max(1)..=hi)
            .rev()
            .find(|&p| self.chars[p - 1].is_whitespace())
    }
}
