//! Similarity search against the vector index

use crate::index::{IndexError, QueryFilter, VectorIndex};
use crate::retrieval::Candidate;
use std::sync::Arc;

/// Issues similarity searches and validates what comes back
pub struct VectorRetriever {
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Up to `top_k` candidates ordered by descending similarity
    ///
    /// Records with no text or a non-finite score make the whole retrieval fail.
    pub fn retrieve(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<Candidate>, IndexError> {
        let mut candidates = self.index.query(embedding, top_k, filter)?;

        for candidate in &candidates {
            if candidate.chunk.text.trim().is_empty() {
                return Err(IndexError::Malformed(format!(
                    "record {} has no text",
                    candidate.chunk.id
                )));
            }
            if !candidate.score.is_finite() {
                return Err(IndexError::Malformed(format!(
                    "record {} has non-finite score",
                    candidate.chunk.id
                )));
            }
        }

        // index order breaks ties
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);

        tracing::debug!(
            "Retrieved {} candidates from {} index",
            candidates.len(),
            self.index.name()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexStats;
    use crate::retrieval::{Chunk, EmbeddedChunk};
    use chrono::Utc;

    struct StaticIndex {
        results: Vec<Candidate>,
    }

    impl VectorIndex for StaticIndex {
        fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
            Ok(chunks.len())
        }

        fn query(
            &self,
            _embedding: &[f32],
            _top_k: usize,
            _filter: Option<&QueryFilter>,
        ) -> Result<Vec<Candidate>, IndexError> {
            Ok(self.results.clone())
        }

        fn stats(&self) -> Result<IndexStats, IndexError> {
            Ok(IndexStats {
                total_vectors: self.results.len() as u64,
                dimension: 1,
                index_fullness: 0.0,
            })
        }

        fn clear(&self) -> Result<(), IndexError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn candidate(id: &str, text: &str, score: f32) -> Candidate {
        Candidate::new(
            Chunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                text: text.to_string(),
                token_count: 1,
                chunk_index: 0,
                position: "1/1".to_string(),
                title: "Untitled".to_string(),
                source: "uploaded".to_string(),
                created_at: Utc::now(),
            },
            score,
        )
    }

    #[test]
    fn test_orders_by_descending_score_and_truncates() {
        let retriever = VectorRetriever::new(Arc::new(StaticIndex {
            results: vec![
                candidate("a", "alpha", 0.2),
                candidate("b", "beta", 0.9),
                candidate("c", "gamma", 0.5),
            ],
        }));

        let results = retriever.retrieve(&[1.0], 2, None).unwrap();
        let ids: Vec<&str> = results.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_ties_keep_index_order() {
        let retriever = VectorRetriever::new(Arc::new(StaticIndex {
            results: vec![
                candidate("first", "one", 0.5),
                candidate("second", "two", 0.5),
            ],
        }));

        let results = retriever.retrieve(&[1.0], 5, None).unwrap();
        assert_eq!(results[0].chunk.id, "first");
        assert_eq!(results[1].chunk.id, "second");
    }

    #[test]
    fn test_record_without_text_is_malformed() {
        let retriever = VectorRetriever::new(Arc::new(StaticIndex {
            results: vec![candidate("a", "  ", 0.9)],
        }));

        assert!(matches!(
            retriever.retrieve(&[1.0], 5, None),
            Err(IndexError::Malformed(_))
        ));
    }
}
