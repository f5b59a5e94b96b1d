//! Cited answer generation
//!
//! - `Generator` trait over chat-style completion backends
//! - `OpenAiGenerator` for the hosted chat completions endpoint
//! - `AnswerGenerator` builds the prompt and sanitizes citation markers in the reply

mod citations;
mod openai;
mod prompt;

pub use citations::{has_citations, is_no_answer, sanitize as sanitize_citations, SanitizedAnswer};
pub use openai::OpenAiGenerator;
pub use prompt::{Prompt, SYSTEM_PROMPT};

use crate::retrieval::SourceCitation;
use std::sync::Arc;
use thiserror::Error;

/// Returned without calling the model when no passage survives retrieval
pub const NO_SOURCES_ANSWER: &str = "I couldn't find any relevant information in the knowledge base to answer your question. Please try rephrasing or upload relevant documents first.";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation service rate limit exceeded")]
    RateLimited,

    #[error("Generation request failed: {0}")]
    Transport(String),

    #[error("Generation service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Malformed generation response: {0}")]
    Malformed(String),

    #[error("Generation service returned no answer text")]
    EmptyAnswer,
}

impl GenerationError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Raw model output with token usage
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Chat-style completion backend
pub trait Generator: Send + Sync {
    /// Single blocking call returning the complete answer
    fn generate(
        &self,
        prompt: &Prompt,
        sources: &[SourceCitation],
    ) -> Result<Generation, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Final answer for one query
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Distinct citation indices referenced by `text`
    pub cited: Vec<usize>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// The answer states that the sources cannot answer the question
    pub no_answer: bool,
}

impl Answer {
    fn without_sources() -> Self {
        Self {
            text: NO_SOURCES_ANSWER.to_string(),
            cited: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            no_answer: true,
        }
    }
}

/// Produces cited answers from budgeted passages
pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
}

impl AnswerGenerator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Answer `query` from `sources`, citing only indices `1..=sources.len()`
    pub fn answer(
        &self,
        query: &str,
        sources: &[SourceCitation],
    ) -> Result<Answer, GenerationError> {
        if sources.is_empty() {
            tracing::debug!("No sources within budget, skipping generation");
            return Ok(Answer::without_sources());
        }

        let prompt = Prompt::build(query, sources);
        let generation = self.generator.generate(&prompt, sources)?;

        let sanitized = sanitize_citations(&generation.text, sources.len());
        if !sanitized.removed.is_empty() {
            tracing::warn!(
                "Removed citation markers {:?} not backed by the {} provided sources",
                sanitized.removed,
                sources.len()
            );
        }

        let no_answer = sanitized.cited.is_empty() && is_no_answer(&sanitized.text);
        Ok(Answer {
            text: sanitized.text,
            cited: sanitized.cited,
            input_tokens: generation.input_tokens,
            output_tokens: generation.output_tokens,
            no_answer,
        })
    }
}

/// Build the generator selected by the configuration
pub fn from_config(
    config: &crate::config::GenerationConfig,
) -> crate::error::Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::from_config(config)?);
    tracing::info!("Generation backend ready: {}", generator.model_name());
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Candidate, Chunk, RankedCandidate};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedGenerator {
        reply: String,
        calls: AtomicUsize,
    }

    impl CannedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Generator for CannedGenerator {
        fn generate(
            &self,
            _prompt: &Prompt,
            _sources: &[SourceCitation],
        ) -> Result<Generation, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generation {
                text: self.reply.clone(),
                input_tokens: 100,
                output_tokens: 10,
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn sources(n: usize) -> Vec<SourceCitation> {
        (1..=n)
            .map(|i| SourceCitation {
                citation_index: i,
                passage: RankedCandidate {
                    candidate: Candidate::new(
                        Chunk {
                            id: format!("doc_{}", i - 1),
                            document_id: "doc".to_string(),
                            text: format!("passage {}", i),
                            token_count: 3,
                            chunk_index: i - 1,
                            position: format!("{}/{}", i, n),
                            title: "Untitled".to_string(),
                            source: "uploaded".to_string(),
                            created_at: Utc::now(),
                        },
                        0.5,
                    ),
                    rerank_score: 0.5,
                    rank: i,
                },
            })
            .collect()
    }

    #[test]
    fn test_zero_sources_skips_model() {
        let generator = Arc::new(CannedGenerator::new("unused"));
        let answer = AnswerGenerator::new(generator.clone())
            .answer("anything", &[])
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(answer.text, NO_SOURCES_ANSWER);
        assert!(answer.no_answer);
        assert_eq!(answer.input_tokens + answer.output_tokens, 0);
    }

    #[test]
    fn test_invalid_citations_are_stripped() {
        let generator = Arc::new(CannedGenerator::new("Fact one [1]. Fact two [3]."));
        let answer = AnswerGenerator::new(generator)
            .answer("q", &sources(2))
            .unwrap();

        assert_eq!(answer.text, "Fact one [1]. Fact two.");
        assert_eq!(answer.cited, vec![1]);
        assert!(!answer.no_answer);
    }

    #[test]
    fn test_insufficient_context_answer() {
        let generator = Arc::new(CannedGenerator::new(
            "The provided context does not contain information about fuel cells.",
        ));
        let answer = AnswerGenerator::new(generator)
            .answer("q", &sources(1))
            .unwrap();

        assert!(answer.no_answer);
        assert!(answer.cited.is_empty());
    }
}
