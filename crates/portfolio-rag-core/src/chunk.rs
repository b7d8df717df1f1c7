//! Recursive character text splitter.
//!
//! Splits document text into overlapping pieces of at most `chunk_size`
//! characters, preferring the coarsest boundary that works:
//! paragraphs, then lines, then sentences, then words, then characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text (`""` always does).
//! 2. Split on it, keeping the separator at the start of each following
//!    piece so no text is lost.
//! 3. Pieces shorter than `chunk_size` are buffered; longer ones flush the
//!    buffer and are split again with the remaining, finer separators.
//! 4. Buffered pieces are merged greedily up to `chunk_size`. When a chunk
//!    is emitted, pieces are dropped from the front until at most
//!    `chunk_overlap` characters remain, and those carry into the next
//!    chunk.
//! 5. Every chunk is whitespace-trimmed; empty chunks are discarded.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text is
//! never cut inside a code point.
//!
//! # Example
//!
//! ```rust
//! use portfolio_rag_core::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(10, 5);
//! assert_eq!(splitter.split_text("aaaa bbbb cccc"), vec!["aaaa bbbb", "bbbb cccc"]);
//! ```

use std::collections::VecDeque;

use crate::models::DocumentChunk;
use crate::transform::TransformRules;

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default characters shared between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const DEFAULT_SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// Size-bounded, overlapping text splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// A splitter with the default separator ladder.
    ///
    /// `chunk_size` is clamped to at least 1 and `chunk_overlap` to below
    /// `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                finer = &[];
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut buffered: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                buffered.push(piece);
                continue;
            }
            if !buffered.is_empty() {
                chunks.extend(self.merge(&buffered));
                buffered.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !buffered.is_empty() {
            chunks.extend(self.merge(&buffered));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, attaching each separator to the piece after it.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Transform one piece of content and split it into [`DocumentChunk`]s.
///
/// The transform runs once on the whole content; every chunk gets a copy
/// of the resulting metadata with `file_path` suffixed `#chunk_<i>`.
pub fn chunk_document(
    rules: &TransformRules,
    splitter: &TextSplitter,
    content: &str,
    source_system: &str,
    file_path: &str,
) -> Vec<DocumentChunk> {
    let (transformed, metadata) = rules.apply_transform(content, source_system, file_path);

    splitter
        .split_text(&transformed)
        .into_iter()
        .enumerate()
        .map(|(i, text)| DocumentChunk::new(text, metadata.for_chunk(i)))
        .collect()
}
