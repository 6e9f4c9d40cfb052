//! Recursive character-boundary text splitter.
//!
//! Splits segment text into overlapping windows of at most `chunk_size`
//! characters. Lengths are counted in Unicode scalar values, never bytes,
//! so multi-byte text is never cut inside a character.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", " ", ""]` that occurs
//!    in the text (`""` means "between any two characters").
//! 2. Split on it, keeping each separator at the start of the piece that
//!    follows it.
//! 3. Pieces shorter than `chunk_size` are collected; a piece that is too
//!    long flushes the collection and is split again with the remaining,
//!    finer separators.
//! 4. Collected pieces are merged greedily into windows. When a window is
//!    full it is emitted and pieces are dropped from its front until at
//!    most `chunk_overlap` characters remain, which then open the next
//!    window.
//! 5. Windows are whitespace-trimmed; empty windows are dropped.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Segment, TextChunk};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter. `chunk_overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidSetting(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidSetting(format!(
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

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one text into windows. Whitespace-only input yields no windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every segment, tagging chunks with their segment's source and
    /// page. Chunk indices are contiguous from 0 across all segments.
    pub fn split_segments(&self, segments: &[Segment]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        for segment in segments {
            for text in self.split_text(&segment.text) {
                let index = chunks.len();
                chunks.push(make_chunk(segment, index, text));
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                out.extend(self.merge_pieces(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }
        if !pending.is_empty() {
            out.extend(self.merge_pieces(&pending));
        }
        out
    }

    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(window) = join_window(&current) {
                    windows.push(window);
                }
                // Keep at most `chunk_overlap` chars, and leave room for `piece`.
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(window) = join_window(&current) {
            windows.push(window);
        }
        windows
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` on `separator`, attaching each separator occurrence to the
/// start of the following piece. An empty separator splits into characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_window(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn make_chunk(segment: &Segment, index: usize, text: String) -> TextChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    TextChunk {
        id: Uuid::new_v4().to_string(),
        source: segment.source.clone(),
        page: segment.page,
        chunk_index: index,
        text,
        hash,
    }
}
