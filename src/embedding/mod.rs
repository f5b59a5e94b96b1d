//! Query and chunk embedding
//!
//! - `Embedder` trait for abstraction over embedding backends
//! - `OpenAiEmbedder` for the hosted embeddings endpoint ("online" mode)
//! - `FastEmbedProvider` for local embedding ("offline" mode)
mod openai;
mod provider;

pub use openai::OpenAiEmbedder;
pub use provider::{Embedder, Embedding, EmbeddingError, FastEmbedProvider};

use crate::config::{EmbeddingConfig, EmbeddingMode};
use crate::error::Result;
use std::sync::Arc;

/// Build the embedder selected by the configuration
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.mode {
        EmbeddingMode::Online => Arc::new(OpenAiEmbedder::from_config(config)?),
        EmbeddingMode::Offline => Arc::new(FastEmbedProvider::new(&config.model)?),
    };
    tracing::info!(
        "Embedding backend ready: {} ({}D)",
        embedder.model_name(),
        embedder.dimension()
    );
    Ok(embedder)
}
