//! Per-document capping of the candidate list

use crate::retrieval::Candidate;
use ahash::{HashMap, HashMapExt};

/// Keep at most `max_per_doc` candidates from each document
///
/// Single stable pass: a candidate survives only if fewer than `max_per_doc` candidates
/// of its document were already kept, so relative order is preserved and equal scores
/// stay in similarity order.
///
/// # Arguments
/// * `candidates` - Candidates ordered by descending similarity
/// * `max_per_doc` - Cap per owning document
pub fn diversify(candidates: Vec<Candidate>, max_per_doc: usize) -> Vec<Candidate> {
    let mut kept_per_doc: HashMap<String, usize> = HashMap::new();

    candidates
        .into_iter()
        .filter(|candidate| {
            let kept = kept_per_doc
                .entry(candidate.chunk.document_id.clone())
                .or_insert(0);
            if *kept < max_per_doc {
                *kept += 1;
                true
            } else {
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Chunk;
    use chrono::Utc;

    fn candidate(id: &str, document_id: &str, score: f32) -> Candidate {
        Candidate::new(
            Chunk {
                id: id.to_string(),
                document_id: document_id.to_string(),
                text: format!("text {}", id),
                token_count: 10,
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
    fn test_caps_each_document() {
        let candidates = vec![
            candidate("x1", "X", 0.9),
            candidate("x2", "X", 0.8),
            candidate("y1", "Y", 0.7),
            candidate("x3", "X", 0.6),
            candidate("y2", "Y", 0.5),
            candidate("y3", "Y", 0.4),
        ];

        let kept = diversify(candidates, 2);
        let ids: Vec<&str> = kept.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["x1", "x2", "y1", "y2"]);
    }

    #[test]
    fn test_cap_larger_than_input_keeps_everything() {
        let candidates = vec![candidate("a", "A", 0.9), candidate("b", "A", 0.8)];
        assert_eq!(diversify(candidates.clone(), 5), candidates);
    }

    #[test]
    fn test_empty_input() {
        assert!(diversify(Vec::new(), 2).is_empty());
    }
}
