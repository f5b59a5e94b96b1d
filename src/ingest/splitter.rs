//! Token-aware recursive text splitter

use crate::tokens;
use std::collections::VecDeque;

/// Separators tried in order; text with none of them is split on character boundaries
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// A chunk of document text with its token count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub token_count: usize,
}

/// Splits text into chunks of at most `chunk_size` tokens, neighbours sharing up to
/// `overlap` tokens
///
/// Text is first broken at the coarsest separator that keeps pieces under the chunk size
/// (paragraphs, then lines, then sentences, then words, then characters) and the pieces
/// are merged back greedily.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.collect_pieces(text, 0, &mut pieces);
        self.merge(pieces)
    }

    /// Break `text` into pieces that each fit the chunk size
    fn collect_pieces(&self, text: &str, level: usize, out: &mut Vec<(String, usize)>) {
        let count = tokens::count(text);
        if count <= self.chunk_size {
            out.push((text.to_string(), count));
            return;
        }

        let Some(separator) = SEPARATORS[level.min(SEPARATORS.len())..]
            .iter()
            .position(|sep| text.contains(sep))
            .map(|offset| level + offset)
        else {
            self.hard_split(text, out);
            return;
        };

        for part in text.split_inclusive(SEPARATORS[separator]) {
            self.collect_pieces(part, separator + 1, out);
        }
    }

    /// Character-boundary split for text without any separator
    fn hard_split(&self, text: &str, out: &mut Vec<(String, usize)>) {
        let chars: Vec<char> = text.chars().collect();
        let mut start = 0;
        while start < chars.len() {
            // cl100k averages several characters per token; shrink until the window fits
            let mut end = (start + self.chunk_size * 4).min(chars.len());
            loop {
                let window: String = chars[start..end].iter().collect();
                let count = tokens::count(&window);
                if count <= self.chunk_size || end - start == 1 {
                    out.push((window, count));
                    break;
                }
                end = start + (end - start) / 2;
            }
            start = end;
        }
    }

    fn merge(&self, pieces: Vec<(String, usize)>) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut window_tokens = 0usize;

        for (piece, count) in pieces {
            if window_tokens + count > self.chunk_size && !window.is_empty() {
                push_chunk(&window, &mut chunks);

                while !window.is_empty()
                    && (window_tokens > self.overlap || window_tokens + count > self.chunk_size)
                {
                    if let Some((_, dropped)) = window.pop_front() {
                        window_tokens -= dropped;
                    }
                }
            }
            window_tokens += count;
            window.push_back((piece, count));
        }
        push_chunk(&window, &mut chunks);

        chunks
    }
}

fn push_chunk(window: &VecDeque<(String, usize)>, chunks: &mut Vec<TextChunk>) {
    let joined: String = window.iter().map(|(piece, _)| piece.as_str()).collect();
    let text = joined.trim();
    if text.is_empty() {
        return;
    }
    chunks.push(TextChunk {
        text: text.to_string(),
        token_count: tokens::count(text),
    });
}
