//! JSON HTTP API over the query engine
//!
//! Handlers hand the blocking pipeline to tokio's blocking pool and map
//! [`RaglineError`] kinds to status codes.

use crate::config::{Config, EmbeddingMode, RerankProvider};
use crate::engine::{QueryEngine, QueryRequest, QueryResponse};
use crate::error::{RaglineError, Result};
use crate::index::IndexStats;
use crate::ingest::{ChunkingError, Document, Ingestor, UploadReport};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<QueryEngine>,
    ingestor: Arc<Ingestor>,
    embedding_mode: EmbeddingMode,
    rerank_provider: RerankProvider,
}

impl AppState {
    pub fn new(engine: Arc<QueryEngine>, config: &Config) -> Self {
        let ingestor = Arc::new(engine.ingestor(&config.ingestion));
        Self {
            engine,
            ingestor,
            embedding_mode: config.embedding.mode,
            rerank_provider: config.rerank.provider,
        }
    }
}

/// Error response `{ "error": <kind>, "message": <text> }`
#[derive(Debug)]
pub struct ApiError(pub RaglineError);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RaglineError::InvalidQuery(_)
            | RaglineError::InvalidBody(_)
            | RaglineError::Ingestion(_) => StatusCode::BAD_REQUEST,
            e @ (RaglineError::Embedding(_) | RaglineError::Generation(_))
                if e.is_rate_limited() =>
            {
                StatusCode::TOO_MANY_REQUESTS
            }
            RaglineError::Embedding(_)
            | RaglineError::Retrieval(_)
            | RaglineError::Generation(_) => StatusCode::SERVICE_UNAVAILABLE,
            RaglineError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RaglineError> for ApiError {
    fn from(err: RaglineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RaglineError::InvalidBody(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run blocking pipeline work off the async workers
async fn run_blocking<T, F>(work: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError(RaglineError::Other(anyhow::anyhow!("worker task failed: {}", e))))?
        .map_err(ApiError)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/upload", post(upload))
        .route("/clear", delete(clear))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM
pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to bind {}", bind),
        })?;
    tracing::info!("ragline listening on http://{}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RaglineError::Io {
            source: e,
            context: "HTTP server error".to_string(),
        })?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ragline",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine.clone();
    let index = match run_blocking(move || engine.stats()).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Index health check failed: {}", e.0);
            "error"
        }
    };

    Json(json!({
        "api": "ok",
        "index": index,
        "embedding": state.embedding_mode.to_string(),
        "rerank": state.rerank_provider.to_string(),
    }))
}

async fn query(
    State(state): State<AppState>,
    request: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResponse>, ApiError> {
    let Json(request) = request?;
    let engine = state.engine.clone();
    let response = run_blocking(move || engine.query(&request)).await?;
    Ok(Json(response))
}

/// Fields of a `multipart/form-data` upload
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    text: Option<String>,
    title: Option<String>,
    source: Option<String>,
    document_id: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> std::result::Result<Self, ApiError> {
        let invalid = |e: axum::extract::multipart::MultipartError| {
            ApiError(RaglineError::InvalidBody(e.body_text()))
        };

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(invalid)?;
                    form.file = Some((filename, bytes));
                }
                "text" => form.text = Some(field.text().await.map_err(invalid)?),
                "title" => form.title = Some(field.text().await.map_err(invalid)?),
                "source" => form.source = Some(field.text().await.map_err(invalid)?),
                "document_id" => form.document_id = Some(field.text().await.map_err(invalid)?),
                other => tracing::debug!("Ignoring upload field '{}'", other),
            }
        }
        Ok(form)
    }

    /// The file wins over `text` when both are sent
    fn into_document(self) -> Result<Document> {
        let mut document = match (self.file, self.text) {
            (Some((filename, bytes)), _) => Document::from_bytes(&filename, &bytes)?,
            (None, Some(text)) => Document::from_text(text),
            (None, None) => return Err(ChunkingError::EmptyText.into()),
        };
        if let Some(title) = self.title.filter(|t| !t.trim().is_empty()) {
            document.title = title;
        }
        if let Some(source) = self.source.filter(|s| !s.trim().is_empty()) {
            document.source = source;
        }
        document.document_id = self.document_id.filter(|id| !id.trim().is_empty());
        Ok(document)
    }
}

/// Accepts a JSON [`Document`] or a multipart form with a `.txt`, `.md` or `.pdf` file
async fn upload(
    State(state): State<AppState>,
    request: Request,
) -> std::result::Result<Json<UploadReport>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let ingestor = state.ingestor.clone();
    let report = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError(RaglineError::InvalidBody(e.body_text())))?;
        let form = UploadForm::read(multipart).await?;
        // PDF extraction is CPU bound, keep it with the ingest work
        run_blocking(move || ingestor.ingest(form.into_document()?)).await?
    } else {
        let Json(document) = Json::<Document>::from_request(request, &state).await?;
        run_blocking(move || ingestor.ingest(document)).await?
    };
    Ok(Json(report))
}

async fn clear(State(state): State<AppState>) -> std::result::Result<Json<Value>, ApiError> {
    let engine = state.engine.clone();
    run_blocking(move || engine.clear()).await?;
    Ok(Json(json!({ "message": "Index cleared" })))
}

async fn stats(State(state): State<AppState>) -> std::result::Result<Json<IndexStats>, ApiError> {
    let engine = state.engine.clone();
    let stats = run_blocking(move || engine.stats()).await?;
    Ok(Json(stats))
}
