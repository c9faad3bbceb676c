mod config;
mod document;
mod search;
mod status;

pub use config::{
    AnswerConfig, Config, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_HASH_DIMENSION, DEFAULT_MAX_ANSWER_CHARS, DEFAULT_MAX_FEATURES, DEFAULT_TOP_K,
    DaemonConfig, EmbeddingBackend, EmbeddingConfig, IndexConfig, IngestConfig, MetricsConfig,
    Pooling, ResolvedConfig, Scheme, SearchConfig, VectorizerConfig,
};
pub use document::{ChunkMeta, Document, DocumentBody, IngestReport, SUMMARY_SUFFIX};
pub use search::{Answer, OutputFormat, ScoreKind, SearchHit, SearchResults};
pub use status::{Health, IndexStatus};
