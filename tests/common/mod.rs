//! Deterministic stand-ins for the remote services, shared by the integration tests
#![allow(dead_code)]

use ragline::config::{IngestionConfig, RetrievalConfig};
use ragline::embedding::{Embedder, Embedding, EmbeddingError};
use ragline::engine::QueryEngine;
use ragline::generation::{Generation, GenerationError, Generator, Prompt};
use ragline::index::{IndexError, IndexStats, InMemoryIndex, QueryFilter, VectorIndex};
use ragline::ingest::{Document, Ingestor};
use ragline::metrics::Pricing;
use ragline::retrieval::{
    Candidate, EmbeddedChunk, RerankError, RerankScore, RerankService, SourceCitation,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DIMENSION: usize = 64;

pub const SOLAR_PASSAGE: &str = "Modern solar panels achieve 15-22% efficiency.";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "was", "what", "which", "with",
];

/// Lowercase content words, punctuation stripped
pub fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn bucket(word: &str) -> usize {
    word.bytes()
        .fold(17usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
        % DIMENSION
}

/// Bag-of-words embedder hashing content words into fixed buckets
pub struct KeywordEmbedder {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps before every embedding, for deadline tests
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let words = content_words(text);
        let mut vector = vec![0.0f32; DIMENSION];
        for word in &words {
            vector[bucket(word)] += 1.0;
        }
        Ok(Embedding {
            vector,
            token_count: words.len().max(1),
        })
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "keyword-hash"
    }
}

/// Scores documents by shared content words with the query
pub struct OverlapReranker;

impl RerankService for OverlapReranker {
    fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankScore>, RerankError> {
        let query_words: HashSet<String> = content_words(query).into_iter().collect();
        let mut scores: Vec<RerankScore> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let words: HashSet<String> = content_words(doc).into_iter().collect();
                let shared = words.intersection(&query_words).count() as f32;
                RerankScore {
                    index,
                    score: shared / (query_words.len().max(1) as f32),
                }
            })
            .collect();
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(top_n);
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        "overlap"
    }
}

/// Always fails like an unavailable rerank endpoint
pub struct UnavailableReranker;

impl RerankService for UnavailableReranker {
    fn rerank(
        &self,
        _query: &str,
        _documents: &[&str],
        _top_n: usize,
    ) -> Result<Vec<RerankScore>, RerankError> {
        Err(RerankError::Service {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }
}

/// Answers from the first source sharing a content word with the question
///
/// Cites `[n]` for the source it used and an out-of-range `[99]` when asked to. Says
/// the context does not contain the answer when no source overlaps.
pub struct ExtractiveGenerator {
    cite_out_of_range: bool,
    calls: AtomicUsize,
}

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self {
            cite_out_of_range: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Appends a marker for a source that was never provided
    pub fn citing_out_of_range() -> Self {
        Self {
            cite_out_of_range: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Generator for ExtractiveGenerator {
    fn generate(
        &self,
        prompt: &Prompt,
        sources: &[SourceCitation],
    ) -> Result<Generation, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let question = prompt
            .user
            .rsplit("Question:")
            .next()
            .unwrap_or_default()
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .to_string();
        let question_words: HashSet<String> = content_words(&question).into_iter().collect();

        let hit = sources.iter().find(|source| {
            content_words(source.text())
                .iter()
                .any(|w| question_words.contains(w))
        });

        let mut text = match hit {
            Some(source) => format!("{} [{}]", source.text(), source.citation_index),
            None => "The provided context does not contain information to answer this question."
                .to_string(),
        };
        if self.cite_out_of_range && hit.is_some() {
            text.push_str(" See also [99].");
        }

        Ok(Generation {
            input_tokens: ragline::tokens::count(&prompt.system)
                + ragline::tokens::count(&prompt.user),
            output_tokens: ragline::tokens::count(&text),
            text,
        })
    }

    fn model_name(&self) -> &str {
        "extractive"
    }
}

/// Refuses every call like an index that cannot be reached
pub struct UnreachableIndex;

impl UnreachableIndex {
    fn refused() -> IndexError {
        IndexError::Unreachable("connection refused".to_string())
    }
}

impl VectorIndex for UnreachableIndex {
    fn upsert(&self, _chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
        Err(Self::refused())
    }

    fn query(
        &self,
        _embedding: &[f32],
        _top_k: usize,
        _filter: Option<&QueryFilter>,
    ) -> Result<Vec<Candidate>, IndexError> {
        Err(Self::refused())
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        Err(Self::refused())
    }

    fn clear(&self) -> Result<(), IndexError> {
        Err(Self::refused())
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

pub struct Harness {
    pub index: Arc<InMemoryIndex>,
    pub embedder: Arc<KeywordEmbedder>,
    pub generator: Arc<ExtractiveGenerator>,
    pub engine: QueryEngine,
}

impl Harness {
    pub fn ingestor(&self) -> Ingestor {
        self.engine.ingestor(&IngestionConfig::default())
    }

    pub fn ingest_text(&self, text: &str, document_id: &str) {
        self.ingestor()
            .ingest(Document::from_text(text).with_document_id(document_id))
            .expect("ingest fixture document");
    }
}

pub fn harness_with(
    embedder: KeywordEmbedder,
    rerank_service: Arc<dyn RerankService>,
    generator: ExtractiveGenerator,
    settings: RetrievalConfig,
) -> Harness {
    let index = Arc::new(InMemoryIndex::new(DIMENSION));
    let embedder = Arc::new(embedder);
    let generator = Arc::new(generator);
    let engine = QueryEngine::new(
        embedder.clone(),
        index.clone() as Arc<dyn VectorIndex>,
        rerank_service,
        generator.clone(),
        settings,
        Pricing::default(),
    );

    Harness {
        index,
        embedder,
        generator,
        engine,
    }
}

pub fn harness() -> Harness {
    harness_with(
        KeywordEmbedder::new(),
        Arc::new(OverlapReranker),
        ExtractiveGenerator::new(),
        RetrievalConfig::default(),
    )
}
