//! Overlapping, page-attributed text chunker.
//!
//! Splits document text into windows of at most `chunk_size` characters
//! with `chunk_overlap` characters of overlap, preferring semantic
//! boundaries in order: paragraph breaks, line breaks, sentence ends,
//! spaces, and finally raw characters.
//!
//! Each chunk's character offsets are recovered by forward substring
//! search from the previous chunk's end, falling back to a monotonic
//! cursor when the text recurs verbatim elsewhere. Page numbers are
//! attributed from cumulative per-page lengths.

use crate::models::ParsedContent;

/// Boundary preference, most semantic first. The empty separator is the
/// raw character fallback.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A chunk of text located within its source document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    pub index: usize,
    pub text: String,
    /// Character offset of the chunk's first character in the source.
    pub char_start: usize,
    /// Character offset one past the chunk's last character.
    pub char_end: usize,
    pub page_number: Option<i64>,
}

/// Splits text into overlapping windows. `chunk_overlap` must be
/// strictly less than `chunk_size` so every step makes forward progress
/// (enforced at config load).
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        debug_assert!(chunk_overlap < chunk_size);
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split parsed content into located chunks.
    pub fn chunk(&self, parsed: &ParsedContent) -> Vec<ChunkSpan> {
        self.chunk_text(&parsed.text, parsed.pages.as_deref())
    }

    /// Split `text` into located chunks, attributing pages when per-page
    /// text is available.
    pub fn chunk_text(&self, text: &str, pages: Option<&[String]>) -> Vec<ChunkSpan> {
        let pieces = self.split(text);

        let mut spans = Vec::with_capacity(pieces.len());
        let mut cursor_byte = 0usize;
        let mut cursor_char = 0usize;

        for (index, piece) in pieces.into_iter().enumerate() {
            let piece_chars = piece.chars().count();

            // Forward search from the previous chunk's end; if the chunk
            // text is not found verbatim (possible after cross-boundary
            // merges), fall back to the monotonic cursor.
            let (char_start, byte_start) = match text[cursor_byte..].find(piece.as_str()) {
                Some(rel) => {
                    let byte_start = cursor_byte + rel;
                    let char_start =
                        cursor_char + text[cursor_byte..byte_start].chars().count();
                    (char_start, byte_start)
                }
                None => (cursor_char, cursor_byte),
            };
            let char_end = char_start + piece_chars;

            // Overlapping windows report non-overlapping ownership: the
            // cursor only ever moves forward. After a fallback the raw
            // byte position can land inside a multi-byte character, so
            // snap forward to the next boundary.
            let mut next_byte = (byte_start + piece.len()).min(text.len());
            while !text.is_char_boundary(next_byte) {
                next_byte += 1;
            }
            if next_byte > cursor_byte {
                cursor_byte = next_byte;
                cursor_char = char_end;
            }

            let page_number = pages.and_then(|pages| page_for_offset(pages, char_start));

            spans.push(ChunkSpan {
                index,
                text: piece,
                char_start,
                char_end,
                page_number,
            });
        }

        spans
    }

    /// Split text into pieces of at most `chunk_size` characters with
    /// `chunk_overlap` characters of overlap.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator actually present in the text wins; the empty
        // separator always matches.
        let (sep_pos, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len() - 1, ""));
        let remaining = &separators[sep_pos + 1..];

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();

        for split in splits {
            if split.chars().count() < self.chunk_size {
                good.push(split);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(split);
            } else {
                chunks.extend(self.split_recursive(&split, remaining));
            }
        }

        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, separator));
        }

        chunks
    }

    /// Merge small splits back together up to `chunk_size`, carrying
    /// `chunk_overlap` characters of trailing context into the next
    /// chunk.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = separator.chars().count();
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let split_len = split.chars().count();
            let join_len = if current.is_empty() { 0 } else { sep_len };

            if total + split_len + join_len > self.chunk_size && !current.is_empty() {
                let piece = current.join(separator).trim().to_string();
                if !piece.is_empty() {
                    chunks.push(piece);
                }
                // Drop leading splits until the retained tail fits in
                // the overlap budget and the incoming split fits.
                while total > self.chunk_overlap
                    || (total + split_len + join_len > self.chunk_size && total > 0)
                {
                    let first = current.remove(0);
                    total -= first.chars().count()
                        + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += split_len + if current.is_empty() { 0 } else { sep_len };
            current.push(split.clone());
        }

        let piece = current.join(separator).trim().to_string();
        if !piece.is_empty() {
            chunks.push(piece);
        }

        chunks
    }
}

/// Best-effort page attribution: the first page whose cumulative length
/// reaches the chunk's start offset.
fn page_for_offset(pages: &[String], char_start: usize) -> Option<i64> {
    let mut cumulative = 0usize;
    for (idx, page) in pages.iter().enumerate() {
        cumulative += page.chars().count();
        if cumulative >= char_start {
            return Some((idx + 1) as i64);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(size, overlap)
    }

    #[test]
    fn short_text_is_one_chunk() {
        let spans = chunker(1000, 200).chunk_text("Tender bond: 5% of contract value.", None);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].char_start, 0);
        assert_eq!(spans[0].index, 0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunker(1000, 200).chunk_text("", None).is_empty());
        assert!(chunker(1000, 200).chunk_text("  \n\n ", None).is_empty());
    }

    #[test]
    fn paragraph_boundaries_preferred() {
        let text = "First paragraph about scope.\n\nSecond paragraph about bonds.\n\nThird paragraph about dates.";
        let spans = chunker(40, 10).chunk_text(text, None);
        assert!(spans.len() > 1);
        // No chunk straddles a paragraph break when paragraphs fit alone.
        for s in &spans {
            assert!(!s.text.contains("\n\n"), "chunk straddles paragraphs: {:?}", s.text);
        }
    }

    #[test]
    fn offsets_are_exact_without_overlap() {
        let text: String = (0..40)
            .map(|i| format!("Requirement number {} applies to the works.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let spans = chunker(120, 0).chunk_text(&text, None);
        assert!(spans.len() > 1);

        let chars: Vec<char> = text.chars().collect();
        for s in &spans {
            let located: String = chars[s.char_start..s.char_end].iter().collect();
            assert_eq!(located, s.text, "chunk not found at reported offsets");
        }
    }

    #[test]
    fn reported_ownership_is_monotonic_with_overlap() {
        let text: String = (0..40)
            .map(|i| format!("Requirement number {} applies to the works.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let spans = chunker(120, 30).chunk_text(&text, None);
        assert!(spans.len() > 1);

        // Overlapping windows still report non-overlapping ownership:
        // starts never move backwards and each span is well-formed.
        let mut prev_start = 0usize;
        let mut prev_end = 0usize;
        for s in &spans {
            assert!(s.char_start >= prev_start);
            assert!(s.char_start >= prev_end || s.char_start == prev_start);
            assert!(s.char_end > s.char_start);
            prev_start = s.char_start;
            prev_end = s.char_end;
        }
    }

    #[test]
    fn chunks_cover_the_source_text() {
        let text: String = (0..30)
            .map(|i| format!("Clause {} shall be complied with fully.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let spans = chunker(100, 20).chunk_text(&text, None);

        let mut covered = vec![false; text.chars().count()];
        for s in &spans {
            for flag in covered.iter_mut().take(s.char_end).skip(s.char_start) {
                *flag = true;
            }
        }
        for (i, c) in text.chars().enumerate() {
            if c.is_alphanumeric() {
                assert!(covered[i], "character {} ({:?}) not covered by any chunk", i, c);
            }
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap_text() {
        let words: String = (0..200).map(|i| format!("word{} ", i)).collect();
        let spans = chunker(100, 30).chunk_text(&words, None);
        assert!(spans.len() > 2);
        for pair in spans.windows(2) {
            let first_token = pair[1].text.split_whitespace().next().unwrap();
            assert!(
                pair[0].text.contains(first_token),
                "chunk {:?} does not carry overlap from {:?}",
                pair[1].text,
                pair[0].text
            );
        }
    }

    #[test]
    fn oversized_single_token_is_hard_split() {
        let text = "x".repeat(250);
        let spans = chunker(100, 20).chunk_text(&text, None);
        assert!(spans.len() >= 3);
        for s in &spans {
            assert!(s.text.chars().count() <= 100);
        }
    }

    #[test]
    fn pages_attributed_from_cumulative_lengths() {
        let page1 = "a".repeat(50);
        let page2 = "b".repeat(50);
        let text = format!("{}{}", page1, page2);
        let pages = vec![page1, page2];
        let spans = chunker(40, 0).chunk_text(&text, Some(&pages));
        assert_eq!(spans.first().unwrap().page_number, Some(1));
        assert_eq!(spans.last().unwrap().page_number, Some(2));
    }

    #[test]
    fn deterministic_output() {
        let text = "Alpha.\n\nBeta.\n\nGamma.\n\nDelta paragraph that is somewhat longer than the rest.";
        let a = chunker(30, 10).chunk_text(text, None);
        let b = chunker(30, 10).chunk_text(text, None);
        assert_eq!(a, b);
    }
}
