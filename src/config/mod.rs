//! Configuration management for ragline
//!
//! TOML file with one section per collaborator, named profiles, and
//! `RAGLINE_SECTION__KEY=value` environment overrides. Every loaded configuration
//! goes through [`ConfigValidator`].

use crate::error::{RaglineError, Result};
use crate::metrics::Pricing;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "RAGLINE_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where the embedder runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Local FastEmbed model
    Offline,
    /// OpenAI-compatible embeddings endpoint
    Online,
}

/// Which cross-encoder scores candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankProvider {
    Cohere,
    Local,
}

/// Which vector index backs retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Process-local exact scan, emptied on restart
    Memory,
    Pinecone,
}

macro_rules! config_enum_text {
    ($ty:ty, $($variant:ident => $text:literal),+) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $text,)+
                })
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "expected one of {:?}, got '{}'",
                        [$($text),+],
                        other
                    )),
                }
            }
        }
    };
}

config_enum_text!(EmbeddingMode, Offline => "offline", Online => "online");
config_enum_text!(RerankProvider, Cohere => "cohere", Local => "local");
config_enum_text!(IndexKind, Memory => "memory", Pinecone => "pinecone");

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Online,
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimension: 1536,
            timeout_secs: 30,
        }
    }
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo-preview".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 800,
            timeout_secs: 60,
        }
    }
}

/// Reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub provider: RerankProvider,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: RerankProvider::Cohere,
            model: "rerank-english-v3.0".to_string(),
            base_url: "https://api.cohere.com/v1".to_string(),
            api_key_env: "COHERE_API_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub kind: IndexKind,
    /// Data-plane host of the Pinecone index
    pub host: String,
    pub api_key_env: String,
    pub namespace: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Memory,
            host: String::new(),
            api_key_env: "PINECONE_API_KEY".to_string(),
            namespace: String::new(),
            dimension: 1536,
            timeout_secs: 10,
        }
    }
}

/// Query pipeline defaults and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub rerank_top_n: usize,
    pub max_per_doc: usize,
    pub max_context_tokens: usize,
    pub preview_chars: usize,
    /// Requests asking for more candidates are clamped to this
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 15,
            rerank_top_n: 5,
            max_per_doc: 2,
            max_context_tokens: 6000,
            preview_chars: 300,
            max_top_k: 100,
        }
    }
}

/// Document ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,
    /// Overlap between neighbouring chunks as a fraction of `chunk_size`
    pub overlap_percent: f32,
    pub upsert_batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap_percent: 0.15,
            upsert_batch_size: 100,
        }
    }
}

impl IngestionConfig {
    pub fn overlap_tokens(&self) -> usize {
        (self.chunk_size as f32 * self.overlap_percent) as usize
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<EmbeddingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_provider: Option<RerankProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_kind: Option<IndexKind>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RaglineError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::warn!("Config file {:?} not found, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RaglineError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides and re-validate
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            RaglineError::Config(format!("Unknown configuration profile '{}'", profile))
        })?;

        if let Some(mode) = overrides.embedding_mode {
            self.embedding.mode = mode;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(dimension) = overrides.embedding_dimension {
            self.embedding.dimension = dimension;
            self.index.dimension = dimension;
        }
        if let Some(provider) = overrides.rerank_provider {
            self.rerank.provider = provider;
        }
        if let Some(kind) = overrides.index_kind {
            self.index.kind = kind;
        }

        tracing::debug!("Applied configuration profile '{}'", profile);
        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGLINE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "SERVER__BIND" => self.server.bind = value.to_string(),
            "EMBEDDING__MODE" => self.embedding.mode = parse_value(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BASE_URL" => self.embedding.base_url = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_value(path, value)?,
            "GENERATION__MODEL" => self.generation.model = value.to_string(),
            "GENERATION__BASE_URL" => self.generation.base_url = value.to_string(),
            "GENERATION__TEMPERATURE" => self.generation.temperature = parse_value(path, value)?,
            "GENERATION__MAX_TOKENS" => self.generation.max_tokens = parse_value(path, value)?,
            "RERANK__PROVIDER" => self.rerank.provider = parse_value(path, value)?,
            "RERANK__MODEL" => self.rerank.model = value.to_string(),
            "INDEX__KIND" => self.index.kind = parse_value(path, value)?,
            "INDEX__HOST" => self.index.host = value.to_string(),
            "INDEX__NAMESPACE" => self.index.namespace = value.to_string(),
            "INDEX__DIMENSION" => self.index.dimension = parse_value(path, value)?,
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_value(path, value)?,
            "RETRIEVAL__RERANK_TOP_N" => self.retrieval.rerank_top_n = parse_value(path, value)?,
            "RETRIEVAL__MAX_PER_DOC" => self.retrieval.max_per_doc = parse_value(path, value)?,
            "RETRIEVAL__MAX_CONTEXT_TOKENS" => {
                self.retrieval.max_context_tokens = parse_value(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RaglineError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragline").join("config.toml"))
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| RaglineError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}': {}", value, e),
        })
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "offline".to_string(),
            ProfileOverrides {
                embedding_mode: Some(EmbeddingMode::Offline),
                embedding_model: Some("all-MiniLM-L6-v2".to_string()),
                embedding_dimension: Some(384),
                rerank_provider: Some(RerankProvider::Local),
                index_kind: Some(IndexKind::Memory),
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            rerank: RerankConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingestion: IngestionConfig::default(),
            pricing: Pricing::default(),
            profiles,
        }
    }
}
