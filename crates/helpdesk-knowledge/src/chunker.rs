//! Recursive character splitter.
//!
//! Text is split on the first separator (in priority order) that occurs in
//! it; pieces still longer than `chunk_size` are split again with the
//! remaining separators. Adjacent small pieces are then merged back into
//! chunks of at most `chunk_size` characters, each new chunk starting with
//! a suffix of the previous one no longer than `chunk_overlap`.
//!
//! Chunks are contiguous slices of the input (trimmed), so `start` always
//! points at `chunk.text` inside the original string.

use helpdesk_core::config::KnowledgeConfig;
use helpdesk_core::types::SourceDocument;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", ",", " ", ""];

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Byte offset of `text` in the source string.
    pub start: usize,
    pub index: usize,
}

/// A chunk ready for embedding, with its source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub title: String,
    pub url: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

type Span = (usize, usize);

fn char_len(text: &str, (s, e): Span) -> usize {
    text[s..e].chars().count()
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(cfg: &KnowledgeConfig) -> Self {
        Self::new(cfg.chunk_size, cfg.chunk_overlap)
    }

    pub fn with_separators(mut self, separators: &[&str]) -> Self {
        self.separators = separators.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let mut spans = Vec::new();
        self.split_span(text, (0, text.len()), &self.separators, &mut spans);

        let mut chunks = Vec::with_capacity(spans.len());
        for (s, e) in spans {
            let slice = &text[s..e];
            let trimmed = slice.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lead = slice.len() - slice.trim_start().len();
            chunks.push(Chunk {
                text: trimmed.to_string(),
                start: s + lead,
                index: chunks.len(),
            });
        }
        chunks
    }

    /// Split every document's indexed text, attaching source metadata.
    pub fn chunk_documents(&self, docs: &[SourceDocument]) -> Vec<DocumentChunk> {
        let mut out = Vec::new();
        for doc in docs {
            let chunks = self.split(&doc.indexed_text());
            let total = chunks.len();
            out.extend(chunks.into_iter().map(|c| DocumentChunk {
                content: c.text,
                title: doc.title.clone(),
                url: doc.url.clone(),
                chunk_index: c.index,
                total_chunks: total,
            }));
        }
        out
    }

    fn split_span(&self, text: &str, span: Span, separators: &[String], out: &mut Vec<Span>) {
        let (start, end) = span;
        let slice = &text[start..end];

        let idx = separators
            .iter()
            .position(|s| s.is_empty() || slice.contains(s.as_str()))
            .unwrap_or(separators.len());
        let separator = separators.get(idx).map(String::as_str).unwrap_or("");
        let remaining = separators.get(idx + 1..).unwrap_or(&[]);

        // separators stay attached to the end of the piece they close
        let pieces: Vec<Span> = if separator.is_empty() {
            slice
                .char_indices()
                .map(|(i, c)| (start + i, start + i + c.len_utf8()))
                .collect()
        } else {
            let mut pieces = Vec::new();
            let mut cursor = start;
            for (i, _) in slice.match_indices(separator) {
                let piece_end = start + i + separator.len();
                pieces.push((cursor, piece_end));
                cursor = piece_end;
            }
            if cursor < end {
                pieces.push((cursor, end));
            }
            pieces
        };

        let mut good = Vec::new();
        for piece in pieces {
            if char_len(text, piece) <= self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                self.merge(text, &good, out);
                good.clear();
            }
            if remaining.is_empty() {
                out.push(piece);
            } else {
                self.split_span(text, piece, remaining, out);
            }
        }
        if !good.is_empty() {
            self.merge(text, &good, out);
        }
    }

    fn merge(&self, text: &str, pieces: &[Span], out: &mut Vec<Span>) {
        let mut current: VecDeque<(Span, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(text, piece);
            if total + len > self.chunk_size {
                if let (Some(first), Some(last)) = (current.front(), current.back()) {
                    out.push((first.0.0, last.0.1));
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, l)) => total -= l,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }
        if let (Some(first), Some(last)) = (current.front(), current.back()) {
            out.push((first.0.0, last.0.1));
        }
    }
}
