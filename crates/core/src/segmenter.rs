use crate::config::IngestionOptions;
use crate::models::Chunk;

const SENTENCE_ENDS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Cuts long text chunks into overlapping windows measured in characters.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    window: usize,
    overlap: usize,
}

impl Segmenter {
    pub fn new(options: &IngestionOptions) -> Self {
        Self::with_window(options.window_chars, options.overlap_chars)
    }

    pub fn with_window(window: usize, overlap: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            overlap: overlap.min(window - 1),
        }
    }

    /// Splits text chunks and renumbers every piece from `first_id`.
    /// Image-derived chunks are kept whole so their description prefix and
    /// url stay together. Returns the pieces and the next free id.
    pub fn split(&self, chunks: Vec<Chunk>, first_id: u64) -> (Vec<Chunk>, u64) {
        let mut cursor = first_id;
        let mut pieces = Vec::new();

        for chunk in chunks {
            if chunk.is_image_derived() {
                pieces.push(Chunk {
                    id: format!("chunk_{cursor}"),
                    ..chunk
                });
                cursor += 1;
                continue;
            }

            for text in self.split_text(&chunk.content) {
                pieces.push(Chunk {
                    id: format!("chunk_{cursor}"),
                    content: text,
                    metadata: chunk.metadata.clone(),
                });
                cursor += 1;
            }
        }

        (pieces, cursor)
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let hard_end = (start + self.window).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.natural_break(&chars, start, hard_end)
                    .unwrap_or(hard_end)
            };

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }

            if end == chars.len() {
                break;
            }
            start = end - self.overlap;
        }

        pieces
    }

    /// Latest boundary in the back half of the window, strongest kind first:
    /// blank line, line break, sentence end, then any whitespace.
    fn natural_break(&self, chars: &[char], start: usize, hard_end: usize) -> Option<usize> {
        let floor = start + (self.window / 2).max(self.overlap + 1);
        if floor >= hard_end {
            return None;
        }

        let window = &chars[floor..hard_end];
        let after = |offset: usize| floor + offset + 1;

        let blank_line = window
            .windows(2)
            .rposition(|pair| pair[0] == '\n' && pair[1] == '\n')
            .map(|offset| after(offset + 1));

        blank_line
            .or_else(|| window.iter().rposition(|c| *c == '\n').map(after))
            .or_else(|| {
                window
                    .iter()
                    .rposition(|c| SENTENCE_ENDS.contains(c))
                    .map(after)
            })
            .or_else(|| window.iter().rposition(|c| c.is_whitespace()).map(after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, IMAGE_DESCRIPTION_PREFIX};

    fn text_chunk(content: String) -> Chunk {
        Chunk {
            id: "chunk_0".to_string(),
            content,
            metadata: ChunkMetadata {
                file_name: "a.txt".to_string(),
                source_path: "/docs/a.txt".to_string(),
                chunk_header: "Intro".to_string(),
                img_url: None,
            },
        }
    }

    fn unbroken_text(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn long_text_without_boundaries_splits_into_overlapping_windows() {
        let segmenter = Segmenter::with_window(1000, 200);
        let pieces = segmenter.split_text(&unbroken_text(2400));

        assert_eq!(pieces.len(), 3);
        for pair in pieces.windows(2) {
            let left: Vec<char> = pair[0].chars().collect();
            let right: Vec<char> = pair[1].chars().collect();
            assert_eq!(left[left.len() - 200..], right[..200]);
        }
        assert_eq!(pieces[0].chars().count(), 1000);
        assert_eq!(pieces[2].chars().count(), 800);
    }

    #[test]
    fn short_text_is_a_single_piece() {
        let segmenter = Segmenter::with_window(1000, 200);
        assert_eq!(segmenter.split_text("  small  "), vec!["small".to_string()]);
        assert!(segmenter.split_text("   ").is_empty());
    }

    #[test]
    fn paragraph_boundary_is_preferred_over_hard_cut() {
        let segmenter = Segmenter::with_window(1000, 200);
        let text = format!("{}\n\n{}", "A".repeat(700), "B".repeat(700));

        let pieces = segmenter.split_text(&text);
        assert_eq!(pieces[0], "A".repeat(700));
        assert!(pieces[1].ends_with(&"B".repeat(700)));
    }

    #[test]
    fn pieces_inherit_metadata_and_get_batch_ids() {
        let segmenter = Segmenter::with_window(1000, 200);
        let image = Chunk {
            id: "chunk_1".to_string(),
            content: format!("{IMAGE_DESCRIPTION_PREFIX}{}", "z".repeat(1500)),
            metadata: ChunkMetadata {
                img_url: Some("/docs/img/a.png".to_string()),
                ..text_chunk(String::new()).metadata
            },
        };

        let (pieces, next) =
            segmenter.split(vec![text_chunk(unbroken_text(2400)), image.clone()], 7);

        assert_eq!(next, 11);
        let ids: Vec<&str> = pieces.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["chunk_7", "chunk_8", "chunk_9", "chunk_10"]);
        assert!(pieces[..3]
            .iter()
            .all(|piece| piece.metadata.chunk_header == "Intro"));
        assert_eq!(pieces[3].content, image.content);
        assert_eq!(pieces[3].metadata, image.metadata);
    }
}
