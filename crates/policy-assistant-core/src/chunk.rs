//! Recursive character text splitter.
//!
//! Splits page text into overlapping segments that respect a configurable
//! `chunk_size` (measured in characters). Splitting prefers paragraph
//! boundaries, then line breaks, then spaces, and only falls back to a hard
//! character cut when nothing else fits.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from the priority list that occurs in the
//!    text (`"\n\n"`, `"\n"`, `" "`, `""`).
//! 2. Split on it, keeping each separator attached to the start of the
//!    piece that follows it.
//! 3. Pieces shorter than `chunk_size` are buffered; oversized pieces are
//!    split again with the remaining, lower-priority separators.
//! 4. Buffered pieces are merged greedily into chunks of at most
//!    `chunk_size` characters. When a chunk is flushed, trailing pieces
//!    totalling at most `chunk_overlap` characters are carried into the
//!    next chunk.
//! 5. Chunks are whitespace-trimmed; empty chunks are dropped.
//!
//! # Example
//!
//! ```rust
//! use policy_assistant_core::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(1000, 100).unwrap();
//! let chunks = splitter.split_text("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks.len(), 1);
//! ```

use std::collections::VecDeque;

use crate::error::{RagError, RagResult};
use crate::models::{LoadedPage, PolicyChunk};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Separators in decreasing priority. The empty separator means "cut
/// between any two characters".
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter with the default separator list.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size` is zero or
    /// `chunk_overlap` is not smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Split raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every page, copying the page's metadata onto each chunk.
    pub fn split_pages(&self, pages: &[LoadedPage]) -> Vec<PolicyChunk> {
        pages
            .iter()
            .flat_map(|page| {
                self.split_text(&page.text)
                    .into_iter()
                    .map(|text| PolicyChunk {
                        text,
                        metadata: page.metadata.clone(),
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, lower) = pick_separator(text, separators);

        let mut chunks = Vec::new();
        let mut buffered: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.chunk_size {
                buffered.push(piece);
                continue;
            }
            if !buffered.is_empty() {
                chunks.extend(self.merge_pieces(&buffered));
                buffered.clear();
            }
            if lower.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, lower));
            }
        }

        if !buffered.is_empty() {
            chunks.extend(self.merge_pieces(&buffered));
        }

        chunks
    }

    /// Greedily merge small pieces into chunks, carrying an overlap tail.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
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

        push_trimmed(&mut chunks, &window);
        chunks
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Choose the first separator present in `text`, returning it together with
/// the lower-priority separators left for recursion.
fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep.as_str()) {
            return (sep.as_str(), &separators[i + 1..]);
        }
    }
    (separators.last().map(String::as_str).unwrap_or(""), &[])
}

/// Split on `separator`, attaching each separator to the following piece.
fn split_keep_start<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        let mut pieces = Vec::with_capacity(text.len());
        let mut bounds = text.char_indices().map(|(i, _)| i).peekable();
        while let Some(start) = bounds.next() {
            let end = bounds.peek().copied().unwrap_or(text.len());
            pieces.push(&text[start..end]);
        }
        return pieces;
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
