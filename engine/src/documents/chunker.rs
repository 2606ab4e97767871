//! Character-window text chunking

/// Splits text into overlapping windows measured in characters
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// `chunk_overlap` is clamped below `chunk_size` so every step advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split `text`, preferring to cut at the last whitespace inside each window
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let window_end = (start + self.chunk_size).min(total);

            let cut = if window_end < total {
                chars[start..window_end]
                    .iter()
                    .rposition(|c| c.is_whitespace())
                    .map(|pos| start + pos + 1)
                    .filter(|&cut| cut > start + self.chunk_overlap)
                    .unwrap_or(window_end)
            } else {
                window_end
            };

            let chunk: String = chars[start..cut].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if cut >= total {
                break;
            }

            // Start the overlap on a word boundary when the overlap holds one
            let overlap_start = cut - self.chunk_overlap;
            start = if overlap_start > 0 && !chars[overlap_start - 1].is_whitespace() {
                chars[overlap_start..cut]
                    .iter()
                    .position(|c| c.is_whitespace())
                    .map(|pos| overlap_start + pos + 1)
                    .unwrap_or(overlap_start)
            } else {
                overlap_start
            };
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::new(1000, 200);
        assert_eq!(chunker.split("  hello world  "), vec!["hello world"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = TextChunker::new(1000, 200);
        assert!(chunker.split("").is_empty());
        assert!(chunker.split(" \n\t ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_and_cut_at_whitespace() {
        let chunker = TextChunker::new(20, 5);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunker.split(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
        // No word is split in two
        for chunk in &chunks {
            for word in chunk.split_whitespace() {
                assert!(text.split_whitespace().any(|w| w == word), "{} was cut", word);
            }
        }
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let chunker = TextChunker::new(10, 4);
        let chunks = chunker.split("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks[0], "abcdefghij");
        assert!(chunks[1].starts_with("ghij"));
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = TextChunker::new(5, 50);
        let chunks = chunker.split("abcdefghijkl");
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }
}
