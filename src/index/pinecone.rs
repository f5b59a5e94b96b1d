//! Pinecone data-plane client (upsert, query, describe_index_stats, delete).

use super::{IndexError, IndexStats, QueryFilter, VectorIndex};
use crate::config::IndexConfig;
use crate::http;
use crate::retrieval::{Candidate, Chunk, EmbeddedChunk};
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderName;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

const API_VERSION: &str = "2024-07";

/// Blocking client for one Pinecone index host
pub struct PineconeIndex {
    client: Client,
    host: String,
    namespace: String,
    dimension: usize,
}

impl PineconeIndex {
    pub fn new(
        api_key: &str,
        host: &str,
        namespace: String,
        dimension: usize,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let client = http::json_client(
            &[
                (HeaderName::from_static("api-key"), api_key),
                (
                    HeaderName::from_static("x-pinecone-api-version"),
                    API_VERSION,
                ),
            ],
            timeout,
            "Pinecone",
        )?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        Ok(Self {
            client,
            host,
            namespace,
            dimension,
        })
    }

    pub fn from_config(config: &IndexConfig) -> crate::error::Result<Self> {
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        Self::new(
            &api_key,
            &config.host,
            config.namespace.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response, IndexError> {
        self.client
            .post(http::endpoint(&self.host, path))
            .json(body)
            .send()
            .map_err(|e| IndexError::Unreachable(e.to_string()))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn ensure_success(resp: Response) -> Result<Response, IndexError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let (status, body) = http::failure_body(resp);
    Err(IndexError::Service { status, body })
}

impl VectorIndex for PineconeIndex {
    fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            self.check_dimension(&chunk.embedding)?;
            vectors.push(UpsertVector {
                id: &chunk.chunk.id,
                values: &chunk.embedding,
                metadata: ChunkMetadata::from_chunk(&chunk.chunk),
            });
        }
        let resp = self.post(
            "vectors/upsert",
            &UpsertRequest {
                vectors,
                namespace: &self.namespace,
            },
        )?;
        let parsed: UpsertResponse = ensure_success(resp)?
            .json()
            .map_err(|e| IndexError::Malformed(format!("upsert response: {}", e)))?;
        Ok(parsed.upserted_count)
    }

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<Candidate>, IndexError> {
        self.check_dimension(embedding)?;
        let request = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.namespace,
            filter: filter.filter(|f| !f.is_empty()).map(filter_expression),
        };
        let resp = self.post("query", &request)?;
        let parsed: QueryResponse = ensure_success(resp)?
            .json()
            .map_err(|e| IndexError::Malformed(format!("query response: {}", e)))?;

        parsed
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.ok_or_else(|| {
                    IndexError::Malformed(format!("match {} has no metadata", m.id))
                })?;
                let metadata: ChunkMetadata = serde_json::from_value(Value::Object(metadata))
                    .map_err(|e| IndexError::Malformed(format!("match {}: {}", m.id, e)))?;
                Ok(Candidate::new(metadata.into_chunk(m.id), m.score))
            })
            .collect()
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let resp = self.post("describe_index_stats", &json!({}))?;
        let parsed: StatsResponse = ensure_success(resp)?
            .json()
            .map_err(|e| IndexError::Malformed(format!("stats response: {}", e)))?;
        Ok(IndexStats {
            total_vectors: parsed.total_vector_count,
            dimension: parsed.dimension,
            index_fullness: parsed.index_fullness,
        })
    }

    fn clear(&self) -> Result<(), IndexError> {
        let resp = self.post(
            "vectors/delete",
            &json!({ "deleteAll": true, "namespace": self.namespace }),
        )?;
        // an already empty namespace is reported as not found
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Namespace '{}' already empty", self.namespace);
            return Ok(());
        }
        ensure_success(resp)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}

fn filter_expression(filter: &QueryFilter) -> Value {
    let mut clauses = Map::new();
    if let Some(document_id) = &filter.document_id {
        clauses.insert("document_id".to_string(), json!({ "$eq": document_id }));
    }
    if let Some(source) = &filter.source {
        clauses.insert("source".to_string(), json!({ "$eq": source }));
    }
    Value::Object(clauses)
}

/// Flat metadata stored next to each vector. Pinecone returns numbers as floats.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkMetadata {
    text: String,
    document_id: String,
    token_count: f64,
    #[serde(default)]
    chunk_index: f64,
    #[serde(default)]
    position: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    created_at: Option<String>,
}

impl ChunkMetadata {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            document_id: chunk.document_id.clone(),
            token_count: chunk.token_count as f64,
            chunk_index: chunk.chunk_index as f64,
            position: chunk.position.clone(),
            title: chunk.title.clone(),
            source: chunk.source.clone(),
            created_at: Some(chunk.created_at.to_rfc3339()),
        }
    }

    fn into_chunk(self, id: String) -> Chunk {
        let created_at = self
            .created_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_default();
        Chunk {
            id,
            document_id: self.document_id,
            text: self.text,
            token_count: self.token_count.max(0.0) as usize,
            chunk_index: self.chunk_index.max(0.0) as usize,
            position: self.position,
            title: self.title,
            source: self.source,
            created_at,
        }
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: ChunkMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    index_fullness: f32,
    #[serde(default)]
    total_vector_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trip_through_float_numbers() {
        let raw = json!({
            "text": "Modern solar panels achieve 15-22% efficiency.",
            "document_id": "text_1700000000",
            "token_count": 11.0,
            "chunk_index": 0.0,
            "position": "1/1",
            "title": "Energy",
            "source": "test_document",
            "created_at": "2024-01-01T00:00:00+00:00"
        });
        let metadata: ChunkMetadata = serde_json::from_value(raw).unwrap();
        let chunk = metadata.into_chunk("text_1700000000_0".to_string());

        assert_eq!(chunk.token_count, 11);
        assert_eq!(chunk.position, "1/1");
        assert_eq!(chunk.created_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_metadata_without_text_is_rejected() {
        let raw = json!({ "document_id": "d", "token_count": 1.0 });
        assert!(serde_json::from_value::<ChunkMetadata>(raw).is_err());
    }

    #[test]
    fn test_filter_expression() {
        let filter = QueryFilter {
            document_id: Some("doc".to_string()),
            source: None,
        };
        assert_eq!(
            filter_expression(&filter),
            json!({ "document_id": { "$eq": "doc" } })
        );
    }

    #[test]
    fn test_query_request_uses_camel_case() {
        let request = QueryRequest {
            vector: &[0.1],
            top_k: 15,
            include_metadata: true,
            include_values: false,
            namespace: "",
            filter: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["topK"], 15);
        assert_eq!(value["includeMetadata"], true);
        assert!(value.get("filter").is_none());
    }
}
