//! Integration tests for document ingestion

mod common;

use common::{harness, KeywordEmbedder};
use ragline::config::IngestionConfig;
use ragline::engine::QueryRequest;
use ragline::index::{InMemoryIndex, QueryFilter, VectorIndex};
use ragline::ingest::{ChunkingError, Document, Ingestor};
use ragline::RaglineError;
use std::io::Write;
use std::sync::Arc;

fn long_document(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| {
            format!(
                "Paragraph {} describes photovoltaic cells, inverters, battery storage and the \
                 grid connection of a rooftop installation in considerable detail.",
                i
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[test]
fn test_long_document_is_split_and_indexed() {
    let index = Arc::new(InMemoryIndex::new(common::DIMENSION));
    let config = IngestionConfig {
        chunk_size: 100,
        overlap_percent: 0.15,
        upsert_batch_size: 3,
    };
    let ingestor = Ingestor::new(Arc::new(KeywordEmbedder::new()), index.clone(), &config);

    let report = ingestor
        .ingest(Document::from_text(long_document(40)).with_title("Rooftop Solar"))
        .unwrap();

    assert!(report.chunks_created > 3, "got {} chunks", report.chunks_created);
    assert_eq!(
        report.message,
        format!("Successfully indexed document with {} chunks", report.chunks_created)
    );
    assert!(report.document_id.starts_with("text_"));
    assert_eq!(index.stats().unwrap().total_vectors, report.chunks_created as u64);

    let filter = QueryFilter {
        document_id: Some(report.document_id.clone()),
        source: None,
    };
    let all_ones = vec![1.0; common::DIMENSION];
    let stored = index.query(&all_ones, 1000, Some(&filter)).unwrap();
    assert_eq!(stored.len(), report.chunks_created);

    let total = report.chunks_created;
    for candidate in &stored {
        let chunk = &candidate.chunk;
        assert_eq!(chunk.title, "Rooftop Solar");
        assert_eq!(chunk.source, "uploaded");
        // merged pieces are recounted, so a join can add a token or two
        assert!(chunk.token_count <= 105, "chunk has {} tokens", chunk.token_count);
        assert_eq!(chunk.position, format!("{}/{}", chunk.chunk_index + 1, total));
        assert_eq!(chunk.id, format!("{}_{}", report.document_id, chunk.chunk_index));
    }
    let sum: usize = stored.iter().map(|c| c.chunk.token_count).sum();
    assert_eq!(sum, report.total_tokens);
}

#[test]
fn test_empty_document_is_rejected() {
    let h = harness();
    let result = h.ingestor().ingest(Document::from_text("  \n\t "));

    assert!(matches!(
        result,
        Err(RaglineError::Ingestion(ChunkingError::EmptyText))
    ));
    assert_eq!(h.index.stats().unwrap().total_vectors, 0);
}

#[test]
fn test_uploaded_file_is_queryable() {
    let h = harness();

    let mut file = tempfile::Builder::new()
        .prefix("energy notes")
        .suffix(".txt")
        .tempfile()
        .unwrap();
    writeln!(file, "Modern solar panels achieve 15-22% efficiency.").unwrap();

    let document = Document::from_path(file.path()).unwrap().with_source("notes");
    let report = h.ingestor().ingest(document).unwrap();

    // whitespace in the filename never reaches the id
    assert!(report.document_id.starts_with("energy_notes"));
    assert!(!report.document_id.contains(' '));

    let response = h
        .engine
        .query(&QueryRequest {
            filter: Some(QueryFilter {
                document_id: None,
                source: Some("notes".to_string()),
            }),
            ..QueryRequest::new("How efficient are solar panels?")
        })
        .unwrap();

    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].metadata.source, "notes");
    assert_eq!(response.sources[0].metadata.document_id, report.document_id);
}

#[test]
fn test_reingesting_same_id_replaces_chunks() {
    let h = harness();
    h.ingest_text("Old text about wind power.", "doc");
    h.ingest_text("New text about solar power.", "doc");

    assert_eq!(h.index.stats().unwrap().total_vectors, 1);
    let response = h.engine.query(&QueryRequest::new("solar power")).unwrap();
    assert!(response.sources[0].text_preview.starts_with("New text"));
}
