//! Chunk and per-query candidate structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable unit of indexed text with its document metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index-wide identifier (`<document_id>_<chunk_index>`)
    pub id: String,

    /// Identifier of the owning document
    pub document_id: String,

    /// Raw chunk text
    pub text: String,

    /// Token count of `text`
    pub token_count: usize,

    /// Zero-based ordinal within the document
    pub chunk_index: usize,

    /// Display position, "i/N" (1-based)
    pub position: String,

    /// Document title
    pub title: String,

    /// Source label supplied at upload
    pub source: String,

    /// When the chunk was created during ingestion
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// First `max_chars` characters, with "..." appended when truncated
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}...", &self.text[..byte_idx]),
            None => self.text.clone(),
        }
    }
}

/// A chunk with the embedding used to index it
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned by similarity search for one query
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk: Chunk,

    /// Cosine similarity to the query (higher is better)
    pub score: f32,
}

impl Candidate {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

/// A candidate after reranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: Candidate,

    /// Cross-encoder relevance, or the similarity score after a fallback
    pub rerank_score: f32,

    /// 1-based dense rank
    pub rank: usize,
}

impl RankedCandidate {
    pub fn chunk(&self) -> &Chunk {
        &self.candidate.chunk
    }

    pub fn token_count(&self) -> usize {
        self.candidate.chunk.token_count
    }
}

/// A ranked candidate that fits the context budget and may be cited
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCitation {
    /// 1-based index referenced as `[n]` in the answer
    pub citation_index: usize,
    pub passage: RankedCandidate,
}

impl SourceCitation {
    pub fn chunk(&self) -> &Chunk {
        self.passage.chunk()
    }

    pub fn text(&self) -> &str {
        &self.passage.chunk().text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: "doc_0".to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            token_count: 4,
            chunk_index: 0,
            position: "1/1".to_string(),
            title: "Untitled".to_string(),
            source: "uploaded".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_preview_short_text_is_untouched() {
        assert_eq!(chunk("short").preview(300), "short");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let c = chunk("ééééé");
        assert_eq!(c.preview(3), "ééé...");
    }
}
