//! Document ingestion: split, embed, upsert

mod splitter;

pub use splitter::{RecursiveSplitter, TextChunk};

use crate::config::IngestionConfig;
use crate::embedding::{Embedder, EmbeddingError};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::retrieval::{Chunk, EmbeddedChunk};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Document text cannot be empty")]
    EmptyText,

    #[error("Unsupported file type '{0}'. Supported: .txt, .md, .pdf")]
    UnsupportedFileType(String),

    #[error("File must be UTF-8 encoded: {0}")]
    InvalidEncoding(String),

    #[error("Failed to read PDF: {0}")]
    InvalidPdf(String),

    #[error("PDF is empty or image-only")]
    EmptyPdf,

    #[error("Document produced no valid chunks")]
    NoChunks,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_source() -> String {
    "uploaded".to_string()
}

/// A document submitted for indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_source")]
    pub source: String,
    /// Name of the uploaded file; prefixes the generated document id
    #[serde(default)]
    pub filename: Option<String>,
    /// Explicit document id, replacing the generated one
    #[serde(default)]
    pub document_id: Option<String>,
}

impl Document {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: default_title(),
            source: default_source(),
            filename: None,
            document_id: None,
        }
    }

    /// Read a `.txt`, `.md` or `.pdf` file
    pub fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        // reject by extension before touching the file
        file_kind(filename)?;

        let bytes = std::fs::read(path).map_err(|e| crate::error::RaglineError::Io {
            source: e,
            context: format!("Failed to read document: {:?}", path),
        })?;
        Self::from_bytes(filename, &bytes)
    }

    /// Extract the text of an uploaded file, picked by its extension
    ///
    /// Text and markdown must be UTF-8. A PDF that yields no text (scanned pages) is
    /// rejected rather than indexed empty.
    pub fn from_bytes(filename: &str, bytes: &[u8]) -> Result<Self> {
        let text = match file_kind(filename)? {
            FileKind::Text => String::from_utf8(bytes.to_vec())
                .map_err(|e| ChunkingError::InvalidEncoding(e.to_string()))?,
            FileKind::Pdf => {
                let text = pdf_extract::extract_text_from_mem(bytes)
                    .map_err(|e| ChunkingError::InvalidPdf(e.to_string()))?;
                if text.trim().is_empty() {
                    return Err(ChunkingError::EmptyPdf.into());
                }
                text
            }
        };

        let filename = Some(filename.to_string()).filter(|name| !name.is_empty());
        Ok(Self {
            filename,
            ..Self::from_text(text)
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    fn resolve_id(&self) -> String {
        if let Some(id) = &self.document_id {
            return id.clone();
        }
        let stem = self
            .filename
            .as_deref()
            .map(|name| name.split_whitespace().collect::<Vec<_>>().join("_"))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "text".to_string());
        format!("{}_{}", stem, Utc::now().timestamp_millis())
    }
}

enum FileKind {
    Text,
    Pdf,
}

fn file_kind(filename: &str) -> std::result::Result<FileKind, ChunkingError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "md" => Ok(FileKind::Text),
        "pdf" => Ok(FileKind::Pdf),
        _ => Err(ChunkingError::UnsupportedFileType(extension)),
    }
}

/// Result of indexing one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReport {
    pub message: String,
    pub chunks_created: usize,
    pub document_id: String,
    pub total_tokens: usize,
}

/// Splits documents, embeds the chunks, and writes them to the index
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    splitter: RecursiveSplitter,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            splitter: RecursiveSplitter::new(config.chunk_size, config.overlap_tokens()),
            batch_size: config.upsert_batch_size.max(1),
        }
    }

    pub fn ingest(&self, document: Document) -> Result<UploadReport> {
        let text = document.text.trim();
        if text.is_empty() {
            return Err(ChunkingError::EmptyText.into());
        }

        let pieces = self.splitter.split(text);
        if pieces.is_empty() {
            return Err(ChunkingError::NoChunks.into());
        }

        let document_id = document.resolve_id();
        let created_at = Utc::now();
        let total = pieces.len();
        tracing::info!(
            "Ingesting document {} ({} chunks, title '{}')",
            document_id,
            total,
            document.title
        );

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| Chunk {
                id: format!("{}_{}", document_id, i),
                document_id: document_id.clone(),
                text: piece.text,
                token_count: piece.token_count,
                chunk_index: i,
                position: format!("{}/{}", i + 1, total),
                title: document.title.clone(),
                source: document.source.clone(),
                created_at,
            })
            .collect();
        let total_tokens = chunks.iter().map(|c| c.token_count).sum();

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts)?;
            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "{} embeddings returned for {} chunks",
                    embeddings.len(),
                    batch.len()
                ))
                .into());
            }

            let embedded: Vec<EmbeddedChunk> = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| EmbeddedChunk {
                    chunk,
                    embedding: embedding.vector,
                })
                .collect();

            let upserted = self.index.upsert(&embedded)?;
            tracing::debug!("Upserted batch of {} vectors", upserted);
        }

        Ok(UploadReport {
            message: format!("Successfully indexed document with {} chunks", total),
            chunks_created: total,
            document_id,
            total_tokens,
        })
    }
}
