use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_FEATURES: usize = 2000;
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_HASH_DIMENSION: u32 = 256;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_PREVIEW_CHARS: usize = 400;
pub const DEFAULT_PER_CHUNK_CHARS: usize = 2000;
pub const DEFAULT_MAX_ANSWER_CHARS: usize = 4000;
pub const DEFAULT_TABULAR_ROWS: usize = 50;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 7;

const APP_DIR: &str = "ragdex";
const CONFIG_FILENAME: &str = "config.toml";
const PROJECT_DIR: &str = ".ragdex";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub vectorizer: VectorizerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// A configuration together with the files it was assembled from.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub config: Config,
    pub global_path: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
}

impl Config {
    /// Directory for app state: index snapshots, socket, pid file, metrics.
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join(APP_DIR))
    }

    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILENAME))
    }

    /// The nearest `.ragdex/` directory above the current working directory,
    /// or `./.ragdex` when none exists yet.
    pub fn project_config_dir() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        let found = cwd
            .ancestors()
            .map(|dir| dir.join(PROJECT_DIR))
            .find(|dir| dir.join(CONFIG_FILENAME).is_file());
        Some(found.unwrap_or_else(|| cwd.join(PROJECT_DIR)))
    }

    pub fn models_dir() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    pub fn metrics_db_path() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("metrics.db"))
    }

    /// Load defaults, then the global file, then the project file, then
    /// environment overrides.
    pub fn load() -> Result<ResolvedConfig, ConfigError> {
        let global_path = Self::global_path().filter(|p| p.is_file());
        let project_path = Self::project_config_dir()
            .map(|dir| dir.join(CONFIG_FILENAME))
            .filter(|p| p.is_file());

        let mut merged = toml::Table::new();
        for path in global_path.iter().chain(project_path.iter()) {
            let content = std::fs::read_to_string(path)?;
            let table: toml::Table = toml::from_str(&content)?;
            merge_tables(&mut merged, table);
        }

        let mut config: Config = toml::Value::Table(merged).try_into()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(ResolvedConfig {
            config,
            global_path,
            project_path,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("RAGDEX_INDEX_DIR")
            && !dir.trim().is_empty()
        {
            self.index.dir = Some(PathBuf::from(dir));
        }
        if let Ok(scheme) = std::env::var("RAGDEX_SCHEME") {
            match scheme.parse() {
                Ok(s) => self.vectorizer.scheme = s,
                Err(e) => tracing::warn!("ignoring RAGDEX_SCHEME: {e}"),
            }
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL")
            && !model.trim().is_empty()
        {
            self.embedding.model_id = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.index.chunk_size, "index.chunk_size"),
            (self.vectorizer.max_features, "vectorizer.max_features"),
            (self.answer.per_chunk_chars, "answer.per_chunk_chars"),
            (self.answer.max_answer_chars, "answer.max_answer_chars"),
            (self.embedding.dimension as usize, "embedding.dimension"),
            (self.embedding.batch_size as usize, "embedding.batch_size"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    pub fn init_global() -> Result<PathBuf, ConfigError> {
        let path = Self::global_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        Self::default().save_to(&path)?;
        Ok(path)
    }

    pub fn init_project() -> Result<PathBuf, ConfigError> {
        let cwd = std::env::current_dir()?;
        let path = cwd.join(PROJECT_DIR).join(CONFIG_FILENAME);
        Self::default().save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index
            .dir
            .clone()
            .or_else(|| Self::data_dir().map(|p| p.join("index")))
            .unwrap_or_else(|| PathBuf::from(PROJECT_DIR).join("index"))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.daemon.socket_path.clone().unwrap_or_else(|| {
            Self::data_dir()
                .unwrap_or_else(|| PathBuf::from(PROJECT_DIR))
                .join("ragdex.sock")
        })
    }

    pub fn pid_path(&self) -> PathBuf {
        self.socket_path().with_extension("pid")
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Snapshot directory. Defaults to `<data dir>/ragdex/index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            chunk_size: default_chunk_size(),
        }
    }
}

/// Which vector representation backs the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Corpus-relative TF-IDF; re-fit on every ingest.
    #[default]
    Tfidf,
    /// Absolute dense embeddings; incremental.
    Dense,
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tfidf" | "tf-idf" | "sparse" => Ok(Scheme::Tfidf),
            "dense" | "embedding" => Ok(Scheme::Dense),
            _ => Err(format!("unknown vector scheme: {}", s)),
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Tfidf => write!(f, "tfidf"),
            Scheme::Dense => write!(f, "dense"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerConfig {
    #[serde(default)]
    pub scheme: Scheme,

    /// Vocabulary cap for the TF-IDF scheme.
    #[serde(default = "default_max_features")]
    pub max_features: usize,
}

fn default_max_features() -> usize {
    DEFAULT_MAX_FEATURES
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::default(),
            max_features: default_max_features(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX model (`model.onnx` + `tokenizer.json`).
    #[default]
    Onnx,
    /// Feature-hashing embedder; needs no model files.
    Hash,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    /// Attention-masked mean over token states (sentence-transformers models).
    #[default]
    Mean,
    /// Hidden state of the last non-padding token (decoder embedding models).
    LastToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Explicit model directory; defaults to `<data dir>/ragdex/models/<model_id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default)]
    pub pooling: Pooling,
}

fn default_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_tokens() -> u32 {
    256
}

fn default_batch_size() -> u32 {
    16
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model_id: default_model_id(),
            model_path: None,
            dimension: default_dimension(),
            max_tokens: default_max_tokens(),
            batch_size: default_batch_size(),
            pooling: Pooling::default(),
        }
    }
}

impl EmbeddingConfig {
    /// Configuration for the model-free hashing embedder.
    pub fn hashed(dimension: u32) -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            dimension,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_k: usize,

    /// Characters of chunk text included in each hit's snippet.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_top_k(),
            preview_chars: default_preview_chars(),
            default_format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default = "default_per_chunk_chars")]
    pub per_chunk_chars: usize,

    #[serde(default = "default_max_answer_chars")]
    pub max_answer_chars: usize,

    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_per_chunk_chars() -> usize {
    DEFAULT_PER_CHUNK_CHARS
}

fn default_max_answer_chars() -> usize {
    DEFAULT_MAX_ANSWER_CHARS
}

fn default_separator() -> String {
    "\n\n".to_string()
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            per_chunk_chars: default_per_chunk_chars(),
            max_answer_chars: default_max_answer_chars(),
            separator: default_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Data rows read (after the header) when summarising tabular files.
    #[serde(default = "default_tabular_rows")]
    pub tabular_rows: usize,
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/.ragdex/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_tabular_rows() -> usize {
    DEFAULT_TABULAR_ROWS
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            tabular_rows: default_tabular_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_auto_start() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            auto_start: default_auto_start(),
            socket_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
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
        assert_eq!(config.index.chunk_size, 1000);
        assert_eq!(config.vectorizer.scheme, Scheme::Tfidf);
        assert_eq!(config.vectorizer.max_features, 2000);
        assert_eq!(config.search.default_k, 5);
        assert_eq!(config.answer.max_answer_chars, 4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [vectorizer]
            scheme = "dense"

            [embedding]
            backend = "hash"
            dimension = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.vectorizer.scheme, Scheme::Dense);
        assert_eq!(config.vectorizer.max_features, DEFAULT_MAX_FEATURES);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.pooling, Pooling::Mean);
        assert_eq!(config.index.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = Config::default();
        config.index.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_merge_tables_overlays_nested_keys() {
        let mut base: toml::Table = toml::from_str(
            r#"
            [search]
            default_k = 3
            preview_chars = 100
            "#,
        )
        .unwrap();
        let overlay: toml::Table = toml::from_str(
            r#"
            [search]
            default_k = 8
            "#,
        )
        .unwrap();
        merge_tables(&mut base, overlay);
        let config: Config = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.search.default_k, 8);
        assert_eq!(config.search.preview_chars, 100);
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("tfidf".parse::<Scheme>().unwrap(), Scheme::Tfidf);
        assert_eq!("Dense".parse::<Scheme>().unwrap(), Scheme::Dense);
        assert!("other".parse::<Scheme>().is_err());
    }

    #[test]
    fn test_index_dir_override() {
        let config = Config {
            index: IndexConfig {
                dir: Some(PathBuf::from("/tmp/custom-index")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/custom-index"));
    }

    #[test]
    fn test_pid_path_sits_next_to_socket() {
        let config = Config {
            daemon: DaemonConfig {
                socket_path: Some(PathBuf::from("/tmp/r/ragdex.sock")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.pid_path(), PathBuf::from("/tmp/r/ragdex.pid"));
    }
}
