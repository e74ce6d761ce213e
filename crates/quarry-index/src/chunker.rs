//! Sliding-window text chunking with fixed overlap.

use crate::error::{IndexError, Result};

/// One chunk of normalized document text.
///
/// Offsets are character positions into the normalized text, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub ordinal: u32,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum chunk length in characters (default: 1800).
    pub max_chars: usize,
    /// Overlap carried into the next window (default: 200).
    pub overlap_chars: usize,
    /// Chunks whose trimmed text is shorter than this are dropped (default: 20).
    pub min_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1800,
            overlap_chars: 200,
            min_chars: 20,
        }
    }
}

impl ChunkConfig {
    /// # Errors
    ///
    /// Returns `IndexError::Config` if the overlap is not strictly smaller
    /// than the window, which would make the window never advance.
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(IndexError::Config("chunk max_chars must be positive".into()));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IndexError::Config(format!(
                "chunk overlap ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Split normalized text into overlapping windows.
///
/// Each window starts `max_chars - overlap_chars` after the previous one, so
/// every character of the input is covered by at least one chunk. Windows are
/// measured in characters so multi-byte text never splits a codepoint.
///
/// # Errors
///
/// Returns `IndexError::Config` for an invalid `ChunkConfig`.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Result<Vec<TextChunk>> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let step = config.max_chars - config.overlap_chars;

    let mut chunks = Vec::new();
    let mut ordinal = 0u32;
    let mut start = 0usize;

    while start < len {
        let end = (start + config.max_chars).min(len);
        let piece: String = chars[start..end].iter().collect();

        if piece.trim().chars().count() >= config.min_chars {
            chunks.push(TextChunk {
                ordinal,
                text: piece,
                char_start: start,
                char_end: end,
            });
            ordinal += 1;
        }

        start += step;
    }

    Ok(chunks)
}
