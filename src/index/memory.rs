//! In-process vector index with exact cosine search
use super::{IndexError, IndexStats, QueryFilter, VectorIndex};
use crate::retrieval::{Candidate, EmbeddedChunk};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Exact-scan index keyed by chunk id
///
/// Contents live only as long as the process. Ties in similarity are returned in
/// chunk id order.
pub struct InMemoryIndex {
    entries: RwLock<BTreeMap<String, EmbeddedChunk>>,
    dimension: usize,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, EmbeddedChunk>>, IndexError> {
        self.entries
            .read()
            .map_err(|_| IndexError::Unreachable("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, EmbeddedChunk>>, IndexError> {
        self.entries
            .write()
            .map_err(|_| IndexError::Unreachable("index lock poisoned".to_string()))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for InMemoryIndex {
    fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
        for chunk in chunks {
            self.check_dimension(&chunk.embedding)?;
        }

        let mut entries = self.write()?;
        for chunk in chunks {
            entries.insert(chunk.chunk.id.clone(), chunk.clone());
        }
        Ok(chunks.len())
    }

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<Candidate>, IndexError> {
        self.check_dimension(embedding)?;

        let entries = self.read()?;
        let mut scored: Vec<Candidate> = entries
            .values()
            .filter(|entry| filter.map_or(true, |f| f.matches(&entry.chunk)))
            .map(|entry| {
                Candidate::new(
                    entry.chunk.clone(),
                    cosine_similarity(embedding, &entry.embedding),
                )
            })
            .collect();

        // stable sort keeps id order among equal scores
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let entries = self.read()?;
        Ok(IndexStats {
            total_vectors: entries.len() as u64,
            dimension: self.dimension,
            index_fullness: 0.0,
        })
    }

    fn clear(&self) -> Result<(), IndexError> {
        self.write()?.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Cosine similarity; zero-length vectors score 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
