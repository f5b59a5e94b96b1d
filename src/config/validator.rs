use crate::config::{Config, EmbeddingMode, IndexKind};
use crate::error::{RaglineError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_ingestion(config, &mut errors);
        Self::validate_pricing(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RaglineError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "server.bind",
                format!("Invalid socket address: {}", config.server.bind),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if embedding.mode == EmbeddingMode::Online {
            Self::require_non_empty(
                &embedding.base_url,
                "embedding.base_url",
                "Base URL",
                errors,
            );
            Self::require_non_empty(
                &embedding.api_key_env,
                "embedding.api_key_env",
                "API key variable",
                errors,
            );
        }

        if embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let generation = &config.generation;

        Self::require_non_empty(&generation.model, "generation.model", "Model name", errors);
        Self::require_non_empty(
            &generation.base_url,
            "generation.base_url",
            "Base URL",
            errors,
        );

        let temp = generation.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "generation.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if generation.max_tokens == 0 {
            errors.push(ValidationError::new(
                "generation.max_tokens",
                "Max tokens must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::require_non_empty(&config.rerank.model, "rerank.model", "Model name", errors);

        if config.rerank.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;

        if index.kind == IndexKind::Pinecone {
            Self::require_non_empty(&index.host, "index.host", "Pinecone host", errors);
        }

        if index.dimension != config.embedding.dimension {
            errors.push(ValidationError::new(
                "index.dimension",
                format!(
                    "Index dimension {} does not match embedding dimension {}",
                    index.dimension, config.embedding.dimension
                ),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        for (path, value) in [
            ("retrieval.top_k", retrieval.top_k),
            ("retrieval.rerank_top_n", retrieval.rerank_top_n),
            ("retrieval.max_per_doc", retrieval.max_per_doc),
            ("retrieval.max_context_tokens", retrieval.max_context_tokens),
            ("retrieval.max_top_k", retrieval.max_top_k),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }

        if retrieval.top_k > retrieval.max_top_k {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                format!(
                    "Default top_k {} exceeds max_top_k {}",
                    retrieval.top_k, retrieval.max_top_k
                ),
            ));
        }
    }

    fn validate_ingestion(config: &Config, errors: &mut Vec<ValidationError>) {
        let ingestion = &config.ingestion;

        if ingestion.chunk_size == 0 {
            errors.push(ValidationError::new(
                "ingestion.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if !(0.0..0.5).contains(&ingestion.overlap_percent) {
            errors.push(ValidationError::new(
                "ingestion.overlap_percent",
                format!(
                    "Overlap must be in [0.0, 0.5), got {}",
                    ingestion.overlap_percent
                ),
            ));
        }

        if ingestion.upsert_batch_size == 0 {
            errors.push(ValidationError::new(
                "ingestion.upsert_batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_pricing(config: &Config, errors: &mut Vec<ValidationError>) {
        let pricing = &config.pricing;
        for (path, value) in [
            ("pricing.embedding_per_1k", pricing.embedding_per_1k),
            ("pricing.llm_input_per_1k", pricing.llm_input_per_1k),
            ("pricing.llm_output_per_1k", pricing.llm_output_per_1k),
            ("pricing.rerank_per_search", pricing.rerank_per_search),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(ValidationError::new(path, "Price must be non-negative"));
            }
        }
    }

    fn require_non_empty(
        value: &str,
        path: &str,
        what: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(
                path,
                format!("{} cannot be empty", what),
            ));
        }
    }
}
