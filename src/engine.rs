//! Query pipeline
//!
//! embed → retrieve → diversify → rerank → budget → generate, strictly in sequence on the
//! calling thread. Every remote stage runs through the metrics collector and, when the
//! caller set a deadline, is preceded by a deadline check.

use crate::config::{Config, IngestionConfig, RetrievalConfig};
use crate::embedding::{self, Embedder};
use crate::error::{RaglineError, Result};
use crate::generation::{self, AnswerGenerator, Generator};
use crate::index::{self, IndexStats, QueryFilter, VectorIndex};
use crate::ingest::Ingestor;
use crate::metrics::{MetricsCollector, Pricing, Stage, TimingBreakdown, TokenEstimate};
use crate::retrieval::{
    self, diversify, Candidate, ContextBudgeter, RerankOutcome, RerankService, Reranker,
    SourceCitation, VectorRetriever,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A question plus optional per-request overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Candidates to retrieve; the configured default when absent
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Passages to keep after reranking; the configured default when absent
    #[serde(default)]
    pub rerank_top_n: Option<usize>,
    #[serde(default)]
    pub filter: Option<QueryFilter>,
    /// Milliseconds after request start by which every remote stage must have started
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceMetadata {
    pub title: String,
    pub source: String,
    pub position: String,
    pub token_count: usize,
    pub document_id: String,
}

/// A cited passage as returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceView {
    pub citation_index: usize,
    pub text_preview: String,
    pub metadata: SourceMetadata,
    pub score: f32,
}

impl SourceView {
    fn from_citation(citation: &SourceCitation, preview_chars: usize) -> Self {
        let chunk = citation.chunk();
        Self {
            citation_index: citation.citation_index,
            text_preview: chunk.preview(preview_chars),
            metadata: SourceMetadata {
                title: chunk.title.clone(),
                source: chunk.source.clone(),
                position: chunk.position.clone(),
                token_count: chunk.token_count,
                document_id: chunk.document_id.clone(),
            },
            score: citation.passage.rerank_score,
        }
    }
}

/// How one query went; logged, never serialized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDiagnostics {
    pub request_id: String,
    pub candidates_retrieved: usize,
    pub candidates_diversified: usize,
    pub rerank_fallback: bool,
    pub rerank_fallback_reason: Option<String>,
    pub passages_budgeted: usize,
    pub passages_excluded: usize,
    pub context_tokens: usize,
    pub cited: Vec<usize>,
    pub no_answer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceView>,
    pub timing: TimingBreakdown,
    pub token_estimate: TokenEstimate,
    #[serde(skip)]
    pub diagnostics: QueryDiagnostics,
}

struct Deadline {
    started: Instant,
    limit_ms: Option<u64>,
}

impl Deadline {
    fn new(limit_ms: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            limit_ms,
        }
    }

    fn check(&self, stage: Stage) -> Result<()> {
        match self.limit_ms {
            Some(limit_ms) if self.started.elapsed() >= Duration::from_millis(limit_ms) => {
                tracing::warn!("Deadline of {}ms passed before {} stage", limit_ms, stage);
                Err(RaglineError::DeadlineExceeded {
                    stage: stage.to_string(),
                    deadline_ms: limit_ms,
                })
            }
            _ => Ok(()),
        }
    }
}

struct QueryParams<'a> {
    query: &'a str,
    top_k: usize,
    rerank_top_n: usize,
}

/// Retrieval-augmented question answering over one vector index
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    retriever: VectorRetriever,
    reranker: Reranker,
    generator: AnswerGenerator,
    budgeter: ContextBudgeter,
    settings: RetrievalConfig,
    pricing: Pricing,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        rerank_service: Arc<dyn RerankService>,
        generator: Arc<dyn Generator>,
        settings: RetrievalConfig,
        pricing: Pricing,
    ) -> Self {
        Self {
            embedder,
            retriever: VectorRetriever::new(index),
            reranker: Reranker::new(rerank_service),
            generator: AnswerGenerator::new(generator),
            budgeter: ContextBudgeter::new(settings.max_context_tokens),
            settings,
            pricing,
        }
    }

    /// Build every collaborator from configuration
    ///
    /// Uses blocking HTTP clients, so this must not run inside an async runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = embedding::from_config(&config.embedding)?;
        let index = index::from_config(&config.index)?;
        let rerank_service = retrieval::reranker_from_config(&config.rerank)?;
        let generator = generation::from_config(&config.generation)?;

        Ok(Self::new(
            embedder,
            index,
            rerank_service,
            generator,
            config.retrieval.clone(),
            config.pricing.clone(),
        ))
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.retriever.index()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Ingestor writing to the same index with the same embedder
    pub fn ingestor(&self, config: &IngestionConfig) -> Ingestor {
        Ingestor::new(self.embedder.clone(), self.index().clone(), config)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        Ok(self.index().stats()?)
    }

    /// Remove every vector; succeeds on an empty index
    pub fn clear(&self) -> Result<()> {
        self.index().clear()?;
        tracing::info!("Cleared {} index", self.index().name());
        Ok(())
    }

    fn validate<'a>(&self, request: &'a QueryRequest) -> Result<QueryParams<'a>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RaglineError::InvalidQuery(
                "Query cannot be empty".to_string(),
            ));
        }

        let top_k = request.top_k.unwrap_or(self.settings.top_k);
        if top_k == 0 {
            return Err(RaglineError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }
        let rerank_top_n = request.rerank_top_n.unwrap_or(self.settings.rerank_top_n);
        if rerank_top_n == 0 {
            return Err(RaglineError::InvalidQuery(
                "rerank_top_n must be at least 1".to_string(),
            ));
        }
        if request.deadline_ms == Some(0) {
            return Err(RaglineError::InvalidQuery(
                "deadline_ms must be at least 1".to_string(),
            ));
        }

        let clamped = top_k.min(self.settings.max_top_k);
        if clamped < top_k {
            tracing::debug!("Clamped top_k {} to {}", top_k, clamped);
        }

        Ok(QueryParams {
            query,
            top_k: clamped,
            rerank_top_n,
        })
    }

    /// Answer one question with cited sources, timing, and cost
    pub fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("query", request_id = %request_id);
        let _guard = span.enter();

        let metrics = MetricsCollector::new();
        let deadline = Deadline::new(request.deadline_ms);
        let params = self.validate(request)?;
        let filter = request.filter.as_ref().filter(|f| !f.is_empty());

        deadline.check(Stage::Embedding)?;
        let embedding =
            metrics.instrument(Stage::Embedding, |q: &str| self.embedder.embed(q))(params.query)?;
        metrics.add_embedding_tokens(embedding.token_count);

        deadline.check(Stage::Retrieval)?;
        let candidates = metrics.instrument(Stage::Retrieval, |vector: &[f32]| {
            self.retriever.retrieve(vector, params.top_k, filter)
        })(&embedding.vector)?;
        let candidates_retrieved = candidates.len();

        let diversified = diversify(candidates, self.settings.max_per_doc);
        let candidates_diversified = diversified.len();

        deadline.check(Stage::Reranking)?;
        if !diversified.is_empty() {
            metrics.add_rerank_search();
        }
        let outcome = match metrics.instrument(Stage::Reranking, |input: Vec<Candidate>| {
            Ok::<_, Infallible>(self.reranker.rerank(params.query, input, params.rerank_top_n))
        })(diversified)
        {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        };
        let rerank_fallback_reason = match &outcome {
            RerankOutcome::Fallback { reason, .. } => Some(reason.to_string()),
            RerankOutcome::Reranked(_) => None,
        };

        let context = self.budgeter.select(outcome.into_ranked());

        if !context.citations.is_empty() {
            deadline.check(Stage::Generation)?;
        }
        let answer = metrics.instrument(Stage::Generation, |sources: &[SourceCitation]| {
            self.generator.answer(params.query, sources)
        })(&context.citations)?;
        metrics.add_generation_tokens(answer.input_tokens, answer.output_tokens);

        let (timing, token_estimate) = metrics.finish(&self.pricing);
        let sources: Vec<SourceView> = context
            .citations
            .iter()
            .map(|c| SourceView::from_citation(c, self.settings.preview_chars))
            .collect();

        tracing::info!(
            "Answered with {} sources in {:.3}s (${:.6})",
            sources.len(),
            timing.total,
            token_estimate.costs.total_usd
        );

        Ok(QueryResponse {
            answer: answer.text,
            sources,
            timing,
            token_estimate,
            diagnostics: QueryDiagnostics {
                request_id,
                candidates_retrieved,
                candidates_diversified,
                rerank_fallback: rerank_fallback_reason.is_some(),
                rerank_fallback_reason,
                passages_budgeted: context.citations.len(),
                passages_excluded: context.excluded,
                context_tokens: context.total_tokens,
                cited: answer.cited,
                no_answer: answer.no_answer,
            },
        })
    }
}
