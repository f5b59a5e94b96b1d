//! Cross-encoder reranking with fall back to upstream order

use crate::config::{RerankConfig, RerankProvider};
use crate::http;
use crate::retrieval::{Candidate, RankedCandidate};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rerank service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Malformed rerank response: {0}")]
    Malformed(String),
}

/// Relevance of one input document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankScore {
    /// Position of the document in the request
    pub index: usize,
    pub score: f32,
}

/// Remote or local cross-encoder
pub trait RerankService: Send + Sync {
    /// Scores for (up to) the `top_n` most relevant documents
    fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankScore>, RerankError>;

    fn model_name(&self) -> &str;
}

/// Result of a rerank step; both variants carry a dense, ranked list
#[derive(Debug)]
pub enum RerankOutcome {
    /// Ordered by descending cross-encoder score
    Reranked(Vec<RankedCandidate>),
    /// Upstream order kept, rerank score copied from similarity
    Fallback {
        ranked: Vec<RankedCandidate>,
        reason: RerankError,
    },
}

impl RerankOutcome {
    pub fn ranked(&self) -> &[RankedCandidate] {
        match self {
            Self::Reranked(ranked) | Self::Fallback { ranked, .. } => ranked,
        }
    }

    pub fn into_ranked(self) -> Vec<RankedCandidate> {
        match self {
            Self::Reranked(ranked) | Self::Fallback { ranked, .. } => ranked,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Reranking component wrapping a [`RerankService`]
pub struct Reranker {
    service: Arc<dyn RerankService>,
}

impl Reranker {
    pub fn new(service: Arc<dyn RerankService>) -> Self {
        Self { service }
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    /// Top `top_n` candidates by cross-encoder relevance
    ///
    /// Never fails: any service error or malformed response yields
    /// [`RerankOutcome::Fallback`] with the first `top_n` inputs in their given order.
    pub fn rerank(&self, query: &str, candidates: Vec<Candidate>, top_n: usize) -> RerankOutcome {
        if candidates.is_empty() || top_n == 0 {
            return RerankOutcome::Reranked(Vec::new());
        }

        let documents: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        let requested = top_n.min(candidates.len());

        let scores = self
            .service
            .rerank(query, &documents, requested)
            .and_then(|scores| validate_scores(scores, candidates.len(), requested));

        match scores {
            Ok(mut scores) => {
                scores.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                scores.truncate(requested);
                let ranked = scores
                    .into_iter()
                    .enumerate()
                    .map(|(position, s)| RankedCandidate {
                        candidate: candidates[s.index].clone(),
                        rerank_score: s.score,
                        rank: position + 1,
                    })
                    .collect();
                RerankOutcome::Reranked(ranked)
            }
            Err(reason) => {
                tracing::warn!(
                    "Reranking with {} failed, keeping retrieval order: {}",
                    self.service.model_name(),
                    reason
                );
                RerankOutcome::Fallback {
                    ranked: upstream_order(candidates, top_n),
                    reason,
                }
            }
        }
    }
}

/// First `top_n` candidates, unchanged order, rerank score = similarity
pub fn upstream_order(candidates: Vec<Candidate>, top_n: usize) -> Vec<RankedCandidate> {
    candidates
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(position, candidate)| RankedCandidate {
            rerank_score: candidate.score,
            candidate,
            rank: position + 1,
        })
        .collect()
}

/// A reply must score at least `requested` distinct, in-range documents
fn validate_scores(
    scores: Vec<RerankScore>,
    input_len: usize,
    requested: usize,
) -> Result<Vec<RerankScore>, RerankError> {
    if scores.len() < requested {
        return Err(RerankError::Malformed(format!(
            "{} scores returned, {} requested",
            scores.len(),
            requested
        )));
    }

    let mut seen = HashSet::new();
    for s in &scores {
        if s.index >= input_len {
            return Err(RerankError::Malformed(format!(
                "index {} out of range for {} documents",
                s.index, input_len
            )));
        }
        if !seen.insert(s.index) {
            return Err(RerankError::Malformed(format!("duplicate index {}", s.index)));
        }
        if !s.score.is_finite() {
            return Err(RerankError::Malformed(format!(
                "non-finite score for index {}",
                s.index
            )));
        }
    }
    Ok(scores)
}

/// Build the rerank service selected by the configuration
pub fn from_config(config: &RerankConfig) -> crate::error::Result<Arc<dyn RerankService>> {
    let service: Arc<dyn RerankService> = match config.provider {
        RerankProvider::Cohere => Arc::new(CohereReranker::from_config(config)?),
        RerankProvider::Local => Arc::new(
            FastEmbedReranker::with_default_model()
                .map_err(|e| crate::error::RaglineError::Config(e.to_string()))?,
        ),
    };
    tracing::info!("Rerank service ready: {}", service.model_name());
    Ok(service)
}

/// Hosted cross-encoder behind the Cohere rerank endpoint
pub struct CohereReranker {
    client: Client,
    endpoint: String,
    model: String,
}

impl CohereReranker {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let auth = format!("Bearer {}", api_key.trim());
        let client = http::json_client(&[(AUTHORIZATION, auth.as_str())], timeout, "Cohere")?;
        Ok(Self {
            client,
            endpoint: http::endpoint(base_url, "rerank"),
            model,
        })
    }

    pub fn from_config(config: &RerankConfig) -> crate::error::Result<Self> {
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        Self::new(
            &api_key,
            &config.base_url,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl RerankService for CohereReranker {
    fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankScore>, RerankError> {
        let body = CohereRequest {
            model: &self.model,
            query,
            documents,
            top_n,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;
        if !resp.status().is_success() {
            let (status, body) = http::failure_body(resp);
            return Err(RerankError::Service { status, body });
        }
        let parsed: CohereResponse = resp
            .json()
            .map_err(|e| RerankError::Malformed(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| RerankScore {
                index: r.index,
                score: r.relevance_score,
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [&'a str],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    results: Vec<CohereResult>,
}

#[derive(Debug, Deserialize)]
struct CohereResult {
    index: usize,
    relevance_score: f32,
}

/// Local cross-encoder using FastEmbed
pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    /// Create the BGE reranker base model (downloaded on first use)
    pub fn with_default_model() -> Result<Self, RerankError> {
        tracing::info!("Initializing local reranker model: BAAI/bge-reranker-base");

        let init_options = RerankInitOptions::new(RerankerModel::BGERerankerBase)
            .with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: "BAAI/bge-reranker-base".to_string(),
        })
    }
}

impl RerankService for FastEmbedReranker {
    fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankScore>, RerankError> {
        if query.is_empty() {
            return Err(RerankError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        let results = self
            .model
            .rerank(query, documents.to_vec(), false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        let mut scored: Vec<RerankScore> = results
            .into_iter()
            .map(|r| RerankScore {
                index: r.index,
                score: r.score,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_n);

        Ok(scored)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Chunk;
    use chrono::Utc;

    enum Script {
        Scores(Vec<RerankScore>),
        Fail,
    }

    struct ScriptedService(Script);

    impl RerankService for ScriptedService {
        fn rerank(
            &self,
            _query: &str,
            _documents: &[&str],
            _top_n: usize,
        ) -> Result<Vec<RerankScore>, RerankError> {
            match &self.0 {
                Script::Scores(scores) => Ok(scores.clone()),
                Script::Fail => Err(RerankError::RerankingError("timeout".to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                Candidate::new(
                    Chunk {
                        id: format!("c{}", i),
                        document_id: format!("d{}", i),
                        text: format!("passage {}", i),
                        token_count: 10,
                        chunk_index: 0,
                        position: "1/1".to_string(),
                        title: "Untitled".to_string(),
                        source: "uploaded".to_string(),
                        created_at: Utc::now(),
                    },
                    1.0 - i as f32 * 0.1,
                )
            })
            .collect()
    }

    fn reranker(script: Script) -> Reranker {
        Reranker::new(Arc::new(ScriptedService(script)))
    }

    #[test]
    fn test_reranked_order_and_dense_ranks() {
        let outcome = reranker(Script::Scores(vec![
            RerankScore { index: 2, score: 0.4 },
            RerankScore { index: 0, score: 0.9 },
            RerankScore { index: 3, score: 0.7 },
        ]))
        .rerank("q", candidates(4), 2);

        assert!(!outcome.is_fallback());
        let ranked = outcome.into_ranked();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk().id, "c0");
        assert_eq!(ranked[1].chunk().id, "c3");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[1].rerank_score, 0.7);
    }

    #[test]
    fn test_failure_falls_back_to_upstream_order() {
        let input = candidates(6);
        let outcome = reranker(Script::Fail).rerank("q", input.clone(), 3);

        assert!(outcome.is_fallback());
        let ranked = outcome.into_ranked();
        assert_eq!(ranked.len(), 3);
        for (i, r) in ranked.iter().enumerate() {
            assert_eq!(r.candidate, input[i]);
            assert_eq!(r.rerank_score, input[i].score);
            assert_eq!(r.rank, i + 1);
        }
    }

    #[test]
    fn test_out_of_range_index_triggers_fallback() {
        let outcome = reranker(Script::Scores(vec![RerankScore { index: 9, score: 0.9 }]))
            .rerank("q", candidates(2), 5);

        match outcome {
            RerankOutcome::Fallback { ranked, reason } => {
                assert_eq!(ranked.len(), 2);
                assert!(matches!(reason, RerankError::Malformed(_)));
            }
            RerankOutcome::Reranked(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn test_short_reply_triggers_fallback() {
        for scores in [vec![], vec![RerankScore { index: 1, score: 0.8 }]] {
            let input = candidates(4);
            let outcome = reranker(Script::Scores(scores)).rerank("q", input.clone(), 3);

            assert!(outcome.is_fallback());
            let ranked = outcome.ranked();
            assert_eq!(ranked.len(), 3);
            assert_eq!(ranked[0].candidate, input[0]);
        }
    }

    #[test]
    fn test_short_reply_is_enough_when_inputs_are_few() {
        let outcome = reranker(Script::Scores(vec![
            RerankScore { index: 1, score: 0.8 },
            RerankScore { index: 0, score: 0.3 },
        ]))
        .rerank("q", candidates(2), 5);

        assert!(!outcome.is_fallback());
        assert_eq!(outcome.ranked()[0].chunk().id, "c1");
    }

    #[test]
    fn test_fewer_inputs_than_top_n() {
        let outcome = reranker(Script::Fail).rerank("q", candidates(2), 5);
        assert_eq!(outcome.ranked().len(), 2);
    }

    #[test]
    fn test_empty_input_skips_service() {
        let outcome = reranker(Script::Fail).rerank("q", Vec::new(), 5);
        assert!(!outcome.is_fallback());
        assert!(outcome.ranked().is_empty());
    }

    #[test]
    fn test_cohere_response_parsing() {
        let raw = r#"{"id":"x","results":[{"index":1,"relevance_score":0.98},{"index":0,"relevance_score":0.12}]}"#;
        let parsed: CohereResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].index, 1);
    }

    #[test]
    #[ignore] // Requires model download
    fn test_local_rerank_basic() {
        let service = FastEmbedReranker::with_default_model().unwrap();
        let scores = service
            .rerank(
                "What is the capital of France?",
                &[
                    "Paris is the capital of France.",
                    "London is the capital of England.",
                    "The weather is nice today.",
                ],
                2,
            )
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].index, 0);
    }
}
