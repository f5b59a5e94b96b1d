//! ragline - cited question answering over your documents
//!
//! A retrieval-augmented query pipeline: embed the question, retrieve candidate
//! passages from a vector index, cap passages per document, rerank with a
//! cross-encoder (falling back to retrieval order), fit the context into a token
//! budget, and generate an answer that cites its sources. Every response carries
//! per-stage timing and an itemized cost estimate.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod http;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod retrieval;
pub mod server;
pub mod tokens;

pub use error::{RaglineError, Result};
