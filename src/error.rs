use crate::embedding::EmbeddingError;
use crate::generation::GenerationError;
use crate::index::IndexError;
use crate::ingest::ChunkingError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ragline
#[derive(Error, Debug)]
pub enum RaglineError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Request rejected before any remote call was made
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// HTTP body that could not be decoded into a request
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Query embedding could not be produced
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index unreachable or returned malformed records
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    /// Answer generation failed
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Document could not be turned into chunks
    #[error("Ingestion failed: {0}")]
    Ingestion(#[from] ChunkingError),

    /// Caller-supplied deadline elapsed before a stage could start
    #[error("Deadline of {deadline_ms}ms exceeded before {stage} stage")]
    DeadlineExceeded { stage: String, deadline_ms: u64 },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RaglineError {
    /// Stable machine-readable error kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::InvalidConfigValue { .. } => "config_error",
            Self::InvalidQuery(_) | Self::InvalidBody(_) => "invalid_request",
            Self::Embedding(_) => "embedding_error",
            Self::Retrieval(_) => "retrieval_error",
            Self::Generation(_) => "generation_error",
            Self::Ingestion(_) => "ingestion_error",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Io { .. } | Self::Toml(_) | Self::TomlSerialization(_) | Self::Json { .. } => {
                "internal_error"
            }
            Self::Other(_) => "internal_error",
        }
    }

    /// Whether a remote collaborator reported rate limiting
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Embedding(e) => e.is_rate_limited(),
            Self::Generation(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ragline operations
pub type Result<T> = std::result::Result<T, RaglineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_distinguish_failures() {
        let invalid = RaglineError::InvalidQuery("empty".to_string());
        assert_eq!(invalid.kind(), "invalid_request");

        let retrieval = RaglineError::from(IndexError::Unreachable("connection refused".into()));
        assert_eq!(retrieval.kind(), "retrieval_error");
        assert!(!retrieval.is_rate_limited());

        let generation = RaglineError::from(GenerationError::RateLimited);
        assert_eq!(generation.kind(), "generation_error");
        assert!(generation.is_rate_limited());
    }
}
