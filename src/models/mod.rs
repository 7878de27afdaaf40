mod config;
mod document;
mod query;
mod search;

pub use config::{
    AnswerConfig, ChunkingConfig, ComposerKind, Config, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_URL,
    DEFAULT_GENERATOR_MODEL, DEFAULT_GENERATOR_URL, DEFAULT_METRICS_RETENTION_DAYS,
    DEFAULT_QDRANT_URL, DEFAULT_TOP_K, EmbeddingConfig, GENERATOR_API_KEY_ENV, GeneratorConfig,
    IngestConfig, LoggingConfig, MetricsConfig, ResolvedConfig, RetrievalConfig, RouterConfig,
    RouterMode, StoreConfig, VECTOR_API_KEY_ENV, VectorDriver, VectorStoreConfig,
    default_keywords,
};
pub use document::{
    Chunk, ChunkMetadata, Document, DocumentId, DocumentStatus, EmbeddingRecord, IngestReport,
    namespace_for,
};
pub use query::{AskRequest, AskResponse, QueryState, Stage};
pub use search::{OutputFormat, VectorHit};
