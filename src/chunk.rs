//! Fixed-window text chunker with overlap.
//!
//! Splits file content into consecutive windows of up to `chunk_size`
//! characters. Each window after the first starts `chunk_size - overlap_size`
//! characters after the previous one, so neighbours share `overlap_size`
//! characters.
//!
//! The unit is the Unicode scalar value (`char`), never the byte, so windows
//! always land on UTF-8 boundaries. Offsets recorded in chunk metadata are
//! char offsets into the original content.
//!
//! # Example
//!
//! ```rust
//! use docchunk::chunk::split_text;
//!
//! let content = "a".repeat(50);
//! let chunks = split_text(&content, 10, 3).unwrap();
//! assert_eq!(chunks.len(), 7);
//! assert_eq!(chunks[6].metadata["start_offset"], 42);
//! ```

use serde_json::{Map, Value};

use crate::error::ChunkingError;
use crate::models::TextChunk;

/// Validated window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    chunk_size: usize,
    overlap_size: usize,
}

impl ChunkWindow {
    /// Rejects `chunk_size == 0` and `overlap_size >= chunk_size`, either of
    /// which would leave the window unable to advance.
    pub fn new(chunk_size: usize, overlap_size: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if overlap_size >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                overlap_size,
            });
        }
        Ok(Self {
            chunk_size,
            overlap_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    /// Distance between the starts of two consecutive windows. Always >= 1.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap_size
    }

    /// Split `content` into overlapping windows.
    ///
    /// Empty or whitespace-only content yields no chunks. Otherwise the
    /// windows cover the content completely and the last one ends exactly at
    /// the content end (it may be shorter than `chunk_size`).
    pub fn split(&self, content: &str) -> Vec<TextChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char start, plus the end of the string.
        let bounds: Vec<usize> = content
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(content.len()))
            .collect();
        let total_chars = bounds.len() - 1;

        let mut chunks = Vec::with_capacity(total_chars / self.stride() + 1);
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(total_chars);
            chunks.push(make_chunk(&content[bounds[start]..bounds[end]], start, end));
            if end == total_chars {
                break;
            }
            start += self.stride();
        }

        chunks
    }
}

/// Split `content` into windows of `chunk_size` chars overlapping by
/// `overlap_size` chars.
///
/// Fails fast on invalid parameters before looking at the content.
pub fn split_text(
    content: &str,
    chunk_size: usize,
    overlap_size: usize,
) -> Result<Vec<TextChunk>, ChunkingError> {
    Ok(ChunkWindow::new(chunk_size, overlap_size)?.split(content))
}

fn make_chunk(text: &str, start: usize, end: usize) -> TextChunk {
    let mut metadata = Map::new();
    metadata.insert("start_offset".to_string(), Value::from(start));
    metadata.insert("end_offset".to_string(), Value::from(end));
    metadata.insert("char_count".to_string(), Value::from(end - start));

    TextChunk {
        text: text.to_string(),
        metadata,
    }
}
