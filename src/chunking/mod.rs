//! Word-window chunking
//!
//! Splits extracted document text into overlapping windows of whitespace-separated
//! words. Window `k` starts at word `k * (chunk_size - overlap)`; the order of the
//! returned windows becomes each chunk's `chunk_index`.

use thiserror::Error;

/// Default number of words per window
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of words shared by consecutive windows
pub const DEFAULT_OVERLAP: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Chunk size must be greater than 0")]
    ZeroChunkSize,

    #[error("Overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Overlapping word-window chunker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker, rejecting settings that would never advance
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance in words between the starts of consecutive windows
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Split `text` into ordered windows, skipping any that are empty
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();

        (0..words.len())
            .step_by(self.stride())
            .map(|start| {
                let end = (start + self.chunk_size).min(words.len());
                words[start..end].join(" ")
            })
            .filter(|window| !window.trim().is_empty())
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_thousand_words_default_settings() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk(&numbered_words(1000));

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[1].starts_with("w450 "));
        assert!(chunks[2].starts_with("w900 "));
        assert_eq!(chunks[0].split_whitespace().count(), 500);
        assert_eq!(chunks[1].split_whitespace().count(), 500);
        assert_eq!(chunks[2].split_whitespace().count(), 100);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        assert_eq!(
            Chunker::new(10, 10),
            Err(ChunkingError::OverlapTooLarge {
                chunk_size: 10,
                overlap: 10
            })
        );
        assert!(Chunker::new(10, 11).is_err());
        assert_eq!(Chunker::new(0, 0), Err(ChunkingError::ZeroChunkSize));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        let chunker = Chunker::new(5, 1).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\t  ").is_empty());
    }

    #[test]
    fn test_windows_cover_text_with_exact_overlap() {
        for (size, overlap, total) in [(5, 0, 23), (5, 2, 23), (7, 6, 30), (3, 1, 3), (4, 1, 1)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            let text = numbered_words(total);
            let chunks = chunker.chunk(&text);
            let windows: Vec<Vec<&str>> = chunks
                .iter()
                .map(|c| c.split_whitespace().collect())
                .collect();

            // every window starts at k * stride
            for (k, window) in windows.iter().enumerate() {
                assert_eq!(window[0], format!("w{}", k * chunker.stride()));
                assert!(window.len() <= size);
            }

            // consecutive full windows share exactly `overlap` words
            for pair in windows.windows(2) {
                if pair[0].len() == size {
                    let tail = &pair[0][size - overlap..];
                    assert_eq!(tail, &pair[1][..overlap.min(pair[1].len())]);
                }
            }

            // the last word of the text is always covered
            let last = format!("w{}", total - 1);
            assert_eq!(windows.last().unwrap().last().unwrap(), &last.as_str());
        }
    }

    #[test]
    fn test_collapses_irregular_whitespace() {
        let chunker = Chunker::new(3, 1).unwrap();
        let chunks = chunker.chunk("alpha\n\nbeta \t gamma   delta");
        assert_eq!(chunks, vec!["alpha beta gamma", "gamma delta"]);
    }
}
