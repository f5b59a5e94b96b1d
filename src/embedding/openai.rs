//! OpenAI-compatible embeddings client.

use super::{Embedder, Embedding, EmbeddingError};
use crate::config::EmbeddingConfig;
use crate::http;
use crate::tokens;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let auth = format!("Bearer {}", api_key.trim());
        let client = http::json_client(&[(AUTHORIZATION, auth.as_str())], timeout, "OpenAI")?;
        Ok(Self {
            client,
            endpoint: http::endpoint(base_url, "embeddings"),
            model,
            dimension,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> crate::error::Result<Self> {
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        Self::new(
            &api_key,
            &config.base_url,
            config.model.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn request(&self, inputs: &[&str]) -> Result<EmbeddingResponse, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !resp.status().is_success() {
            let (status, body) = http::failure_body(resp);
            return Err(EmbeddingError::Service { status, body });
        }

        let mut parsed: EmbeddingResponse = resp.json().map_err(|e| {
            EmbeddingError::GenerationError(format!("failed to parse embedding response: {}", e))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        for entry in &parsed.data {
            if entry.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.embedding.len(),
                });
            }
        }
        Ok(parsed)
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        let parsed = self.request(&[text])?;
        let token_count = parsed
            .usage
            .map(|u| u.prompt_tokens)
            .unwrap_or_else(|| tokens::count(text));
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".into()))?;

        Ok(Embedding {
            vector,
            token_count,
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let parsed = self.request(&inputs)?;

        // usage is reported per request, so per-item counts come from the tokenizer
        Ok(parsed
            .data
            .into_iter()
            .zip(texts)
            .map(|(entry, text)| Embedding {
                vector: entry.embedding,
                token_count: tokens::count(text),
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    prompt_tokens: usize,
}
