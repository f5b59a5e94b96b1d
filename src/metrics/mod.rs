//! Per-query stage timing and cost accounting
//!
//! Remote stages are wrapped with [`MetricsCollector::instrument`], which records elapsed
//! wall-clock time and hands the stage result back untouched. Token usage is added as stages
//! report it; [`MetricsCollector::finish`] turns both into the response records.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Remote stages of the query pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Embedding,
    Retrieval,
    Reranking,
    Generation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Retrieval => "retrieval",
            Self::Reranking => "reranking",
            Self::Generation => "generation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit prices in USD
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    /// Per 1K embedding tokens
    pub embedding_per_1k: f64,
    /// Per 1K prompt tokens
    pub llm_input_per_1k: f64,
    /// Per 1K completion tokens
    pub llm_output_per_1k: f64,
    /// Flat price per rerank call
    pub rerank_per_search: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            embedding_per_1k: 0.00002,
            llm_input_per_1k: 0.01,
            llm_output_per_1k: 0.03,
            rerank_per_search: 0.002,
        }
    }
}

/// Token counts collected during one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub embedding_tokens: usize,
    pub llm_input_tokens: usize,
    pub llm_output_tokens: usize,
    pub rerank_searches: usize,
}

/// Elapsed seconds per stage, rounded to milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimingBreakdown {
    pub embedding: f64,
    pub retrieval: f64,
    pub reranking: f64,
    pub generation: f64,
    pub total: f64,
}

/// Costs in USD, rounded to 6 decimals
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Costs {
    pub embedding_usd: f64,
    pub llm_input_usd: f64,
    pub llm_output_usd: f64,
    pub rerank_usd: f64,
    pub total_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenEstimate {
    pub embedding_tokens: usize,
    pub llm_input_tokens: usize,
    pub llm_output_tokens: usize,
    pub total_tokens: usize,
    pub costs: Costs,
}

impl Pricing {
    pub fn estimate(&self, usage: &Usage) -> TokenEstimate {
        let embedding = usage.embedding_tokens as f64 / 1000.0 * self.embedding_per_1k;
        let llm_input = usage.llm_input_tokens as f64 / 1000.0 * self.llm_input_per_1k;
        let llm_output = usage.llm_output_tokens as f64 / 1000.0 * self.llm_output_per_1k;
        let rerank = usage.rerank_searches as f64 * self.rerank_per_search;

        TokenEstimate {
            embedding_tokens: usage.embedding_tokens,
            llm_input_tokens: usage.llm_input_tokens,
            llm_output_tokens: usage.llm_output_tokens,
            total_tokens: usage.embedding_tokens + usage.llm_input_tokens + usage.llm_output_tokens,
            costs: Costs {
                embedding_usd: round_to(embedding, 6),
                llm_input_usd: round_to(llm_input, 6),
                llm_output_usd: round_to(llm_output, 6),
                rerank_usd: round_to(rerank, 6),
                total_usd: round_to(embedding + llm_input + llm_output + rerank, 6),
            },
        }
    }
}

/// Timing and usage for one query; lives on the query's thread only
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    elapsed: RefCell<HashMap<Stage, Duration>>,
    usage: RefCell<Usage>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            elapsed: RefCell::new(HashMap::new()),
            usage: RefCell::new(Usage::default()),
        }
    }

    /// Wrap `op` so that calling it records the elapsed time of `stage`
    ///
    /// The result or error of `op` is returned unchanged.
    pub fn instrument<'a, I, T, E>(
        &'a self,
        stage: Stage,
        op: impl FnOnce(I) -> Result<T, E> + 'a,
    ) -> impl FnOnce(I) -> Result<T, E> + 'a {
        move |input| {
            let start = Instant::now();
            let result = op(input);
            let elapsed = start.elapsed();

            *self.elapsed.borrow_mut().entry(stage).or_default() += elapsed;
            tracing::debug!(
                "{} stage {} in {:.3}s",
                stage,
                if result.is_ok() { "finished" } else { "failed" },
                elapsed.as_secs_f64()
            );
            result
        }
    }

    pub fn stage_elapsed(&self, stage: Stage) -> Duration {
        self.elapsed
            .borrow()
            .get(&stage)
            .copied()
            .unwrap_or_default()
    }

    /// Time since the collector was created
    pub fn total_elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn add_embedding_tokens(&self, tokens: usize) {
        self.usage.borrow_mut().embedding_tokens += tokens;
    }

    pub fn add_generation_tokens(&self, input: usize, output: usize) {
        let mut usage = self.usage.borrow_mut();
        usage.llm_input_tokens += input;
        usage.llm_output_tokens += output;
    }

    pub fn add_rerank_search(&self) {
        self.usage.borrow_mut().rerank_searches += 1;
    }

    pub fn usage(&self) -> Usage {
        *self.usage.borrow()
    }

    pub fn timing(&self) -> TimingBreakdown {
        let secs = |stage| round_to(self.stage_elapsed(stage).as_secs_f64(), 3);
        TimingBreakdown {
            embedding: secs(Stage::Embedding),
            retrieval: secs(Stage::Retrieval),
            reranking: secs(Stage::Reranking),
            generation: secs(Stage::Generation),
            total: round_to(self.total_elapsed().as_secs_f64(), 3),
        }
    }

    pub fn finish(&self, pricing: &Pricing) -> (TimingBreakdown, TokenEstimate) {
        (self.timing(), pricing.estimate(&self.usage()))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_instrument_passes_results_through() {
        let metrics = MetricsCollector::new();

        let doubled = metrics.instrument(Stage::Embedding, |x: u32| Ok::<_, String>(x * 2))(21);
        assert_eq!(doubled, Ok(42));

        let failed =
            metrics.instrument(Stage::Retrieval, |_: ()| Err::<u32, _>("down".to_string()))(());
        assert_eq!(failed, Err("down".to_string()));
    }

    #[test]
    fn test_instrument_records_elapsed_time() {
        let metrics = MetricsCollector::new();
        metrics
            .instrument(Stage::Generation, |_: ()| {
                thread::sleep(Duration::from_millis(20));
                Ok::<_, ()>(())
            })(())
            .unwrap();

        assert!(metrics.stage_elapsed(Stage::Generation) >= Duration::from_millis(20));
        assert_eq!(metrics.stage_elapsed(Stage::Reranking), Duration::ZERO);

        let timing = metrics.timing();
        assert!(timing.generation >= 0.02);
        assert!(timing.total >= timing.generation);
        assert_eq!(timing.reranking, 0.0);
    }

    #[test]
    fn test_cost_estimate() {
        let usage = Usage {
            embedding_tokens: 10,
            llm_input_tokens: 1000,
            llm_output_tokens: 100,
            rerank_searches: 1,
        };
        let estimate = Pricing::default().estimate(&usage);

        assert_eq!(estimate.total_tokens, 1110);
        assert_eq!(estimate.costs.embedding_usd, 0.0);
        assert_eq!(estimate.costs.llm_input_usd, 0.01);
        assert_eq!(estimate.costs.llm_output_usd, 0.003);
        assert_eq!(estimate.costs.rerank_usd, 0.002);
        assert_eq!(estimate.costs.total_usd, 0.015);
    }

    #[test]
    fn test_usage_accumulates() {
        let metrics = MetricsCollector::new();
        metrics.add_embedding_tokens(9);
        metrics.add_generation_tokens(120, 30);
        metrics.add_rerank_search();

        let (_, estimate) = metrics.finish(&Pricing::default());
        assert_eq!(estimate.embedding_tokens, 9);
        assert_eq!(estimate.llm_input_tokens, 120);
        assert_eq!(estimate.llm_output_tokens, 30);
        assert_eq!(estimate.costs.rerank_usd, 0.002);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(0.0123456789, 6), 0.012346);
        assert_eq!(round_to(1.23456, 3), 1.235);
    }
}
