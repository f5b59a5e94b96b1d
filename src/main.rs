use ragline::cli::{Cli, Commands, ConfigAction};
use ragline::config::{Config, IndexKind};
use ragline::embedding;
use ragline::engine::{QueryEngine, QueryRequest, QueryResponse};
use ragline::error::{RaglineError, Result};
use ragline::index::{self, QueryFilter};
use ragline::ingest::{Document, Ingestor};
use ragline::server::{self, AppState};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // API keys usually live in a local .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let config_path = cli.config;
    let profile = cli.profile;

    match cli.command {
        Commands::Serve { bind } => {
            let config = load_config(config_path, profile.as_deref())?;
            cmd_serve(&config, bind)?;
        }
        Commands::Ask {
            question,
            top_k,
            rerank_top_n,
            document_id,
            ingest,
            json,
        } => {
            let config = load_config(config_path, profile.as_deref())?;
            let request = QueryRequest {
                top_k,
                rerank_top_n,
                filter: document_id.map(|id| QueryFilter {
                    document_id: Some(id),
                    source: None,
                }),
                ..QueryRequest::new(question)
            };
            cmd_ask(&config, request, &ingest, json)?;
        }
        Commands::Ingest {
            file,
            title,
            source,
        } => {
            let config = load_config(config_path, profile.as_deref())?;
            cmd_ingest(&config, &file, title, source)?;
        }
        Commands::Stats => {
            let config = load_config(config_path, profile.as_deref())?;
            cmd_stats(&config)?;
        }
        Commands::Clear => {
            let config = load_config(config_path, profile.as_deref())?;
            cmd_clear(&config)?;
        }
        Commands::Config { action } => {
            cmd_config(config_path, profile.as_deref(), action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("ragline=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragline=info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_serve(config: &Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind.parse().map_err(|_| RaglineError::InvalidConfigValue {
        path: "server.bind".to_string(),
        message: format!("Invalid socket address: {}", bind),
    })?;

    // blocking HTTP clients are created and finally dropped outside the runtime
    let engine = Arc::new(QueryEngine::from_config(config)?);
    warn_if_ephemeral(config);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| RaglineError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })?;
    let result = runtime.block_on(server::serve(AppState::new(engine.clone(), config), addr));
    drop(runtime);
    drop(engine);

    result
}

fn cmd_ask(config: &Config, request: QueryRequest, files: &[PathBuf], json: bool) -> Result<()> {
    let engine = QueryEngine::from_config(config)?;

    if !files.is_empty() {
        let ingestor = engine.ingestor(&config.ingestion);
        for file in files {
            let report = ingestor.ingest(Document::from_path(file)?)?;
            eprintln!(
                "✓ Indexed {} ({} chunks, {} tokens)",
                file.display(),
                report.chunks_created,
                report.total_tokens
            );
        }
    } else if config.index.kind == IndexKind::Memory {
        tracing::warn!("In-memory index starts empty; pass --ingest FILE to add documents");
    }

    let response = engine.query(&request)?;

    if json {
        let out = serde_json::to_string_pretty(&response).map_err(|e| RaglineError::Json {
            source: e,
            context: "Failed to serialize response".to_string(),
        })?;
        println!("{}", out);
    } else {
        print_response(&response);
    }

    Ok(())
}

fn print_response(response: &QueryResponse) {
    println!("{}\n", response.answer);

    if response.sources.is_empty() {
        println!("No sources.");
    } else {
        println!("Sources:");
        for source in &response.sources {
            println!(
                "  [{}] {} ({}, {}) score {:.3}",
                source.citation_index,
                source.metadata.title,
                source.metadata.document_id,
                source.metadata.position,
                source.score
            );
            println!("      {}", source.text_preview.replace('\n', " "));
        }
    }

    let timing = &response.timing;
    let tokens = &response.token_estimate;
    println!(
        "\nTiming: embed {:.3}s | retrieve {:.3}s | rerank {:.3}s | generate {:.3}s | total {:.3}s",
        timing.embedding, timing.retrieval, timing.reranking, timing.generation, timing.total
    );
    println!(
        "Tokens: {} (embed {}, in {}, out {}) | Cost: ${:.6}",
        tokens.total_tokens,
        tokens.embedding_tokens,
        tokens.llm_input_tokens,
        tokens.llm_output_tokens,
        tokens.costs.total_usd
    );
    if response.diagnostics.rerank_fallback {
        println!("Note: reranking unavailable, sources are in retrieval order");
    }
}

fn cmd_ingest(
    config: &Config,
    file: &Path,
    title: Option<String>,
    source: Option<String>,
) -> Result<()> {
    warn_if_ephemeral(config);

    let embedder = embedding::from_config(&config.embedding)?;
    let index = index::from_config(&config.index)?;
    let ingestor = Ingestor::new(embedder, index, &config.ingestion);

    let mut document = Document::from_path(file)?;
    if let Some(title) = title {
        document = document.with_title(title);
    }
    if let Some(source) = source {
        document = document.with_source(source);
    }

    let report = ingestor.ingest(document)?;
    println!("✓ {}", report.message);
    println!("  Document ID: {}", report.document_id);
    println!("  Chunks: {}", report.chunks_created);
    println!("  Tokens: {}", report.total_tokens);

    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let index = index::from_config(&config.index)?;
    let stats = index.stats()?;

    println!("Index: {}", index.name());
    println!("  Vectors: {}", stats.total_vectors);
    println!("  Dimension: {}", stats.dimension);
    println!("  Fullness: {:.2}%", stats.index_fullness * 100.0);

    Ok(())
}

fn cmd_clear(config: &Config) -> Result<()> {
    let index = index::from_config(&config.index)?;
    index.clear()?;
    println!("✓ Index cleared");
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<&str>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = toml::Value::try_from(&config)?;

            let shown = match section {
                Some(name) => {
                    let section_value = value.get(&name).ok_or_else(|| {
                        RaglineError::Config(format!("Unknown configuration section '{}'", name))
                    })?;
                    let mut table = toml::map::Map::new();
                    table.insert(name, section_value.clone());
                    toml::to_string_pretty(&toml::Value::Table(table))?
                }
                None => toml::to_string_pretty(&value)?,
            };
            println!("{}", shown);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let mut config = Config::load(&path)?;
            if let Some(profile) = profile {
                config.apply_profile(profile)?;
            }
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!(
                "  Embedding: {} ({}, {}D)",
                config.embedding.model, config.embedding.mode, config.embedding.dimension
            );
            println!("  Rerank: {} ({})", config.rerank.model, config.rerank.provider);
            println!("  Index: {}", config.index.kind);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
            println!("  API keys are read from OPENAI_API_KEY, COHERE_API_KEY and PINECONE_API_KEY");
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<&str>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = Config::load_or_default(&path)?;
    if let Some(profile) = profile {
        config.apply_profile(profile)?;
    }
    Ok(config)
}

fn warn_if_ephemeral(config: &Config) {
    if config.index.kind == IndexKind::Memory {
        tracing::warn!("Using the in-memory index; indexed documents are lost when the process exits");
    }
}
