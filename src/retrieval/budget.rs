//! Token budget for the generation context

use crate::retrieval::{RankedCandidate, SourceCitation};

/// Passages selected for the prompt
#[derive(Debug, Clone, Default)]
pub struct BudgetedContext {
    /// Included passages, citation indices 1..k in rank order
    pub citations: Vec<SourceCitation>,
    /// Sum of token counts of the included passages
    pub total_tokens: usize,
    /// Ranked passages left out because the budget was reached
    pub excluded: usize,
}

/// Greedy prefix selection under a token budget
///
/// Walks passages in rank order and stops at the first one that would push the running
/// total past the budget. Smaller passages after that point are not considered.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudgeter {
    max_tokens: usize,
}

impl ContextBudgeter {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn select(&self, ranked: Vec<RankedCandidate>) -> BudgetedContext {
        let available = ranked.len();
        let mut citations = Vec::new();
        let mut total_tokens = 0usize;

        for passage in ranked {
            // an overflowing sum is over any budget
            let next_total = match total_tokens.checked_add(passage.token_count()) {
                Some(next) if next <= self.max_tokens => next,
                _ => break,
            };
            total_tokens = next_total;
            citations.push(SourceCitation {
                citation_index: citations.len() + 1,
                passage,
            });
        }

        let excluded = available - citations.len();
        if excluded > 0 {
            tracing::debug!(
                "Context budget of {} tokens reached: kept {}, excluded {}",
                self.max_tokens,
                citations.len(),
                excluded
            );
        }

        BudgetedContext {
            citations,
            total_tokens,
            excluded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Candidate, Chunk};
    use chrono::Utc;

    fn ranked(token_counts: &[usize]) -> Vec<RankedCandidate> {
        token_counts
            .iter()
            .enumerate()
            .map(|(i, &tokens)| RankedCandidate {
                candidate: Candidate::new(
                    Chunk {
                        id: format!("c{}", i),
                        document_id: "doc".to_string(),
                        text: format!("passage {}", i),
                        token_count: tokens,
                        chunk_index: i,
                        position: format!("{}/{}", i + 1, token_counts.len()),
                        title: "Untitled".to_string(),
                        source: "uploaded".to_string(),
                        created_at: Utc::now(),
                    },
                    0.5,
                ),
                rerank_score: 0.5,
                rank: i + 1,
            })
            .collect()
    }

    #[test]
    fn test_exact_fit_is_included() {
        let context = ContextBudgeter::new(3000).select(ranked(&[1000; 10]));

        assert_eq!(context.citations.len(), 3);
        assert_eq!(context.total_tokens, 3000);
        assert_eq!(context.excluded, 7);
    }

    #[test]
    fn test_stops_at_first_overflow() {
        // the 50-token passage after the large one is never considered
        let context = ContextBudgeter::new(1000).select(ranked(&[400, 700, 50]));

        assert_eq!(context.citations.len(), 1);
        assert_eq!(context.total_tokens, 400);
    }

    #[test]
    fn test_citation_indices_follow_rank_order() {
        let context = ContextBudgeter::new(6000).select(ranked(&[100, 200, 300]));

        let indices: Vec<usize> = context.citations.iter().map(|c| c.citation_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let ids: Vec<&str> = context
            .citations
            .iter()
            .map(|c| c.chunk().id.as_str())
            .collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_overflowing_token_count_is_over_budget() {
        let context = ContextBudgeter::new(usize::MAX).select(ranked(&[10, usize::MAX, 1]));

        assert_eq!(context.citations.len(), 1);
        assert_eq!(context.total_tokens, 10);
        assert_eq!(context.excluded, 2);
    }

    #[test]
    fn test_first_passage_over_budget_yields_nothing() {
        let context = ContextBudgeter::new(10).select(ranked(&[11, 1]));
        assert!(context.citations.is_empty());
        assert_eq!(context.excluded, 2);
    }
}
