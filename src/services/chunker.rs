//! Positional text chunking with overlap.

use crate::error::ChunkError;
use crate::models::ChunkingConfig;

/// Splits text into fixed-size, overlapping character windows.
///
/// Windows start at `0, step, 2 * step, ...` with `step = size - overlap`
/// and stop after the first window that reaches the end of the text. Sizes
/// are counted in `char`s, so a window never splits a UTF-8 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if size == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if overlap >= size {
            return Err(ChunkError::InvalidOverlap { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Self::new(config.size, config.overlap)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk `text` into owned windows in document order.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.spans(text)
            .into_iter()
            .map(|(start, end)| text[start..end].to_string())
            .collect()
    }

    /// Byte ranges of each window.
    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        if text.is_empty() {
            return Vec::new();
        }

        // char index -> byte offset, with a trailing entry for the end
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = boundaries.len() - 1;

        if total_chars <= self.size {
            return vec![(0, text.len())];
        }

        let step = self.size - self.overlap;
        let mut spans = Vec::with_capacity(expected_chunks(total_chars, self.size, self.overlap));
        let mut start = 0;

        loop {
            let end = (start + self.size).min(total_chars);
            spans.push((boundaries[start], boundaries[end]));

            if end >= total_chars {
                break;
            }
            start += step;
        }

        spans
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            size: config.size,
            overlap: config.overlap,
        }
    }
}

/// Chunk `text` into windows of `size` characters overlapping by `overlap`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    Ok(TextChunker::new(size, overlap)?.chunk(text))
}

/// Number of windows produced for a text of `len` characters.
pub fn expected_chunks(len: usize, size: usize, overlap: usize) -> usize {
    if len == 0 {
        return 0;
    }
    if len <= size {
        return 1;
    }
    let step = size - overlap;
    (len - overlap).div_ceil(step)
}
