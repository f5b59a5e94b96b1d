//! Retrieval stages
//!
//! Similarity search, per-document diversity, cross-encoder reranking with fallback,
//! and the token budget that decides which passages reach the prompt.

mod budget;
mod candidate;
mod diversity;
mod reranker;
mod retriever;

pub use budget::{BudgetedContext, ContextBudgeter};
pub use candidate::{Candidate, Chunk, EmbeddedChunk, RankedCandidate, SourceCitation};
pub use diversity::diversify;
pub use reranker::{
    from_config as reranker_from_config, upstream_order, CohereReranker, FastEmbedReranker,
    RerankError, RerankOutcome, RerankScore, RerankService, Reranker,
};
pub use retriever::VectorRetriever;
