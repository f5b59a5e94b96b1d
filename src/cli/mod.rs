//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    author = "neur0map",
    about = "Cited question answering over your documents",
    long_about = "ragline embeds a question, retrieves and diversifies matching passages, reranks them \
                  with a cross-encoder, fits them into a token budget, and asks a language model for an \
                  answer that cites its sources. Every answer reports per-stage timing and cost."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragline/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "offline")
    #[arg(short, long, global = true, env = "RAGLINE_PROFILE")]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Answer a question from the indexed documents
    Ask {
        /// Question to ask
        question: String,

        /// Number of candidates to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Number of passages kept after reranking
        #[arg(short = 'n', long)]
        rerank_top_n: Option<usize>,

        /// Only consider passages from this document
        #[arg(long)]
        document_id: Option<String>,

        /// Index these files first (useful with the in-memory index)
        #[arg(long = "ingest", value_name = "FILE")]
        ingest: Vec<PathBuf>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split, embed and index a .txt, .md or .pdf file
    Ingest {
        /// File to index
        file: PathBuf,

        /// Document title
        #[arg(short, long)]
        title: Option<String>,

        /// Source label stored with every chunk
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show vector index statistics
    Stats,

    /// Remove every vector from the index
    Clear,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
