//! Vector index capability
//!
//! The index is an external, internally synchronized resource. `InMemoryIndex` serves
//! local runs and tests; `PineconeIndex` talks to a hosted index over HTTP.

mod memory;
mod pinecone;

pub use memory::InMemoryIndex;
pub use pinecone::PineconeIndex;

use crate::config::{IndexConfig, IndexKind};
use crate::error::Result;
use crate::retrieval::{Candidate, Chunk, EmbeddedChunk};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector index unreachable: {0}")]
    Unreachable(String),

    #[error("Vector index returned malformed record: {0}")]
    Malformed(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector index returned {status}: {body}")]
    Service { status: u16, body: String },
}

/// Index-level statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub index_fullness: f32,
}

/// Optional metadata restriction applied during similarity search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none() && self.source.is_none()
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.document_id
            .as_ref()
            .map_or(true, |id| *id == chunk.document_id)
            && self.source.as_ref().map_or(true, |s| *s == chunk.source)
    }
}

/// Similarity-search store of embedded chunks
pub trait VectorIndex: Send + Sync {
    /// Insert or replace chunks by id; returns the number written
    fn upsert(&self, chunks: &[EmbeddedChunk]) -> std::result::Result<usize, IndexError>;

    /// Up to `top_k` candidates by descending similarity, metadata included
    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> std::result::Result<Vec<Candidate>, IndexError>;

    fn stats(&self) -> std::result::Result<IndexStats, IndexError>;

    /// Remove every vector; succeeds on an already empty index
    fn clear(&self) -> std::result::Result<(), IndexError>;

    fn name(&self) -> &str;
}

/// Build the vector index selected by the configuration
pub fn from_config(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.kind {
        IndexKind::Memory => Arc::new(InMemoryIndex::new(config.dimension)),
        IndexKind::Pinecone => Arc::new(PineconeIndex::from_config(config)?),
    };
    tracing::info!("Vector index ready: {} ({}D)", index.name(), config.dimension);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(document_id: &str, source: &str) -> Chunk {
        Chunk {
            id: format!("{}_0", document_id),
            document_id: document_id.to_string(),
            text: "text".to_string(),
            token_count: 1,
            chunk_index: 0,
            position: "1/1".to_string(),
            title: "Untitled".to_string(),
            source: source.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = QueryFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&chunk("a", "uploaded")));
    }

    #[test]
    fn test_filter_fields_are_conjunctive() {
        let filter = QueryFilter {
            document_id: Some("a".to_string()),
            source: Some("report".to_string()),
        };
        assert!(filter.matches(&chunk("a", "report")));
        assert!(!filter.matches(&chunk("a", "uploaded")));
        assert!(!filter.matches(&chunk("b", "report")));
    }
}
