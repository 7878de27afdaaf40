pub mod chunk_store;
pub mod chunker;
pub mod composer;
pub mod embedding;
pub mod extract;
pub mod generator;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod retriever;
pub mod router;
pub mod similarity;
pub mod vector_store;

pub use chunk_store::{ChunkStore, DocumentCatalog, SqliteStore};
pub use chunker::{TextChunker, chunk_text};
pub use composer::{
    AnswerComposer, ExtractiveComposer, GenerativeComposer, NO_CONTEXT_ANSWER, build_prompt,
};
pub use embedding::{Embedder, HealthResponse, HttpEmbedder};
pub use extract::extract_text;
pub use generator::{Generator, HttpGenerator};
pub use ingest::Ingestor;
pub use metrics::{AskRecord, MetricsSnapshot, MetricsStore, MetricsSummary, PipelineMetrics};
pub use orchestrator::Orchestrator;
pub use retriever::{NamespacePolicy, Retriever};
pub use router::{AlwaysRetrieve, Classifier, KeywordRouter, classifier_from_config};
pub use similarity::{cosine_similarity, rank_score};
pub use vector_store::{
    MemoryIndex, PgVectorIndex, QdrantIndex, SqliteIndex, UnavailableIndex, VectorIndex,
    create_backend,
};
