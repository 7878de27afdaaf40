use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:16334";
pub const DEFAULT_COLLECTION: &str = "document_chunks";
pub const DEFAULT_GENERATOR_URL: &str = "https://router.huggingface.co/v1";
pub const DEFAULT_GENERATOR_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";
pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_TOP_K: u32 = 5;
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 30;

const APP_DIR: &str = "docqa";
const PROJECT_DIR: &str = ".docqa";
const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding `generator.api_key`.
pub const GENERATOR_API_KEY_ENV: &str = "DOCQA_GENERATOR_API_KEY";
/// Environment variable overriding `vector_store.api_key`.
pub const VECTOR_API_KEY_ENV: &str = "DOCQA_VECTOR_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// A loaded configuration together with the file it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn project_path() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .map(|p| p.join(PROJECT_DIR).join(CONFIG_FILE))
    }

    /// Directory holding the SQLite databases when no path is configured.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise the project config
    /// (`./.docqa/config.toml`) wins over the global one, and defaults are
    /// used when neither exists. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::PathError(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => [Self::project_path(), Self::global_path()]
                .into_iter()
                .flatten()
                .find(|p| p.exists()),
        };

        let mut config = match &path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;

        Ok(ResolvedConfig { config, path })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(GENERATOR_API_KEY_ENV)
            && !key.is_empty()
        {
            self.generator.api_key = Some(key);
        }
        if let Ok(key) = std::env::var(VECTOR_API_KEY_ENV)
            && !key.is_empty()
        {
            self.vector_store.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.size must be > 0".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be >= 1".to_string(),
            ));
        }
        if self.ingest.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.concurrency must be >= 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Write this configuration as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            dimension: default_dimension(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    /// Process-local index, lost on exit
    Memory,
    /// SQLite table of vectors scored in-process
    #[default]
    Sqlite,
    Qdrant,
    #[serde(alias = "postgres")]
    PostgreSQL,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Memory => write!(f, "memory"),
            VectorDriver::Sqlite => write!(f, "sqlite"),
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::PostgreSQL => write!(f, "postgresql"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    /// Qdrant URL or PostgreSQL connection string.
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// SQLite file for the `sqlite` driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Qdrant collection or PostgreSQL table name.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_pool_max() -> u32 {
    5
}

impl VectorStoreConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("vectors.db"))
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            path: None,
            collection: default_collection(),
            api_key: None,
            pool_max: default_pool_max(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Chunk store and document catalog location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("docqa.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub size: usize,

    /// Characters repeated between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    #[default]
    Keywords,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: RouterMode,

    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

pub fn default_keywords() -> Vec<String> {
    [
        "document",
        "file",
        "policy",
        "content",
        "mentioned",
        "objective",
        "describe",
        "explain",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::default(),
            keywords: default_keywords(),
        }
    }
}

/// Answer composition strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposerKind {
    #[default]
    Extractive,
    Generative,
}

impl std::str::FromStr for ComposerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extractive" => Ok(ComposerKind::Extractive),
            "generative" => Ok(ComposerKind::Generative),
            _ => Err(format!("unknown answer strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for ComposerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposerKind::Extractive => write!(f, "extractive"),
            ComposerKind::Generative => write!(f, "generative"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default)]
    pub strategy: ComposerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_generator_url")]
    pub url: String,

    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_generator_attempts")]
    pub max_attempts: u32,
}

fn default_generator_url() -> String {
    DEFAULT_GENERATOR_URL.to_string()
}

fn default_generator_model() -> String {
    DEFAULT_GENERATOR_MODEL.to_string()
}

fn default_generator_timeout() -> u64 {
    60
}

fn default_generator_attempts() -> u32 {
    2
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: default_generator_url(),
            model: default_generator_model(),
            api_key: None,
            timeout_secs: default_generator_timeout(),
            max_attempts: default_generator_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Chunks embedded and upserted at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug or trace.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `docqa::services::retriever = "debug"`.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

impl MetricsConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("metrics.db"))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            path: None,
            retention_days: default_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.chunking.size, 800);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.vector_store.driver, VectorDriver::Sqlite);
        assert_eq!(config.answer.strategy, ComposerKind::Extractive);
        assert_eq!(config.router.keywords.len(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            size = 200

            [vector_store]
            driver = "postgres"
            url = "postgres://localhost/docqa"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.size, 200);
        assert_eq!(config.chunking.overlap, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(config.vector_store.driver, VectorDriver::PostgreSQL);
        assert_eq!(config.embedding.url, DEFAULT_EMBEDDING_URL);
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = Config::default();
        config.chunking.size = 100;
        config.chunking.overlap = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::PathError(_))));
    }

    #[test]
    fn test_save_and_load_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.retrieval.top_k = 7;
        config.answer.strategy = ComposerKind::Generative;
        config.save_to(&path).unwrap();

        let resolved = Config::load(Some(&path)).unwrap();
        assert_eq!(resolved.path.as_deref(), Some(path.as_path()));
        assert_eq!(resolved.config.retrieval.top_k, 7);
        assert_eq!(resolved.config.answer.strategy, ComposerKind::Generative);
    }

    #[test]
    fn test_composer_kind_parse() {
        assert_eq!(
            "Generative".parse::<ComposerKind>(),
            Ok(ComposerKind::Generative)
        );
        assert!("abstractive".parse::<ComposerKind>().is_err());
    }
}
