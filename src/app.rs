//! Wiring of capabilities from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, IngestError};
use crate::models::{ComposerKind, Config};
use crate::services::{
    AnswerComposer, Embedder, ExtractiveComposer, GenerativeComposer, HttpEmbedder,
    HttpGenerator, Ingestor, MetricsStore, NamespacePolicy, Orchestrator, PipelineMetrics,
    Retriever, SqliteStore, TextChunker, UnavailableIndex, VectorIndex, classifier_from_config,
    create_backend,
};
use crate::utils::RetryConfig;

/// Per-request overrides of the configured answer pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AskOptions {
    pub policy: NamespacePolicy,
    pub top_k: Option<usize>,
    pub strategy: Option<ComposerKind>,
}

/// Shared capabilities built once per process.
pub struct AppContext {
    pub config: Config,
    pub embedder: Arc<HttpEmbedder>,
    pub index: Arc<dyn VectorIndex>,
    pub store: Arc<SqliteStore>,
    pub metrics: Arc<PipelineMetrics>,
}

impl AppContext {
    pub async fn from_config(config: Config) -> Result<Self, AppError> {
        let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
        let index = create_backend(&config.vector_store, embedder.dimension()).await?;
        let store = Arc::new(SqliteStore::open(&config.store.resolved_path())?);

        Ok(Self {
            config,
            embedder,
            index,
            store,
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Like [`AppContext::from_config`], but an unreachable vector backend is
    /// replaced by an [`UnavailableIndex`] so questions still get an answer.
    pub async fn for_questions(config: Config) -> Result<Self, AppError> {
        let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
        let metrics = Arc::new(PipelineMetrics::new());
        let index = match create_backend(&config.vector_store, embedder.dimension()).await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(
                    "vector store {} unavailable, answering without context: {e}",
                    config.vector_store.driver
                );
                metrics.record_backend_failure();
                Arc::new(UnavailableIndex::new(
                    config.vector_store.driver.to_string(),
                    e.to_string(),
                )) as Arc<dyn VectorIndex>
            }
        };
        let store = Arc::new(SqliteStore::open(&config.store.resolved_path())?);

        Ok(Self {
            config,
            embedder,
            index,
            store,
            metrics,
        })
    }

    fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.config.embedding.timeout_secs)
    }

    pub fn retriever(&self, policy: NamespacePolicy, top_k: Option<usize>) -> Retriever {
        Retriever::new(
            self.embedder.clone(),
            self.index.clone(),
            self.store.clone(),
            self.store.clone(),
        )
        .with_policy(policy)
        .with_top_k(top_k.unwrap_or(self.config.retrieval.top_k as usize))
        .with_timeout(self.embedding_timeout())
        .with_metrics(self.metrics.clone())
    }

    pub fn composer(&self, kind: ComposerKind) -> Result<Arc<dyn AnswerComposer>, AppError> {
        Ok(match kind {
            ComposerKind::Extractive => Arc::new(ExtractiveComposer),
            ComposerKind::Generative => {
                let generator = HttpGenerator::new(&self.config.generator)?;
                Arc::new(
                    GenerativeComposer::new(Arc::new(generator))
                        .with_timeout(Duration::from_secs(self.config.generator.timeout_secs))
                        .with_retry(RetryConfig::new(self.config.generator.max_attempts))
                        .with_metrics(self.metrics.clone()),
                )
            }
        })
    }

    pub fn orchestrator(&self, options: AskOptions) -> Result<Orchestrator, AppError> {
        let strategy = options.strategy.unwrap_or(self.config.answer.strategy);
        Ok(Orchestrator::new(
            classifier_from_config(&self.config.router),
            Arc::new(self.retriever(options.policy, options.top_k)),
            self.composer(strategy)?,
        )
        .with_metrics(self.metrics.clone()))
    }

    pub fn ingestor(&self) -> Result<Ingestor, AppError> {
        let chunker = TextChunker::from_config(&self.config.chunking).map_err(IngestError::from)?;
        Ok(Ingestor::new(
            chunker,
            self.embedder.clone(),
            self.index.clone(),
            self.store.clone(),
            self.store.clone(),
        )
        .with_concurrency(self.config.ingest.concurrency)
        .with_retry(RetryConfig::new(self.config.embedding.max_attempts))
        .with_timeout(self.embedding_timeout())
        .with_metrics(self.metrics.clone()))
    }

    /// Ask log, when metrics are enabled and the database opens.
    pub fn metrics_store(&self) -> Option<MetricsStore> {
        if !self.config.metrics.enabled {
            return None;
        }
        match MetricsStore::open(&self.config.metrics.resolved_path()) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::debug!("metrics store unavailable: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AskRequest, VectorDriver};
    use crate::services::NO_CONTEXT_ANSWER;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.vector_store.driver = VectorDriver::Memory;
        config.store.path = Some(dir.join("docqa.db"));
        config.metrics.path = Some(dir.join("metrics.db"));
        config
    }

    #[tokio::test]
    async fn test_from_config_wires_local_backends() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppContext::from_config(config(dir.path())).await.unwrap();

        assert_eq!(app.index.name(), "memory");
        assert!(app.ingestor().is_ok());
        assert!(app.orchestrator(AskOptions::default()).is_ok());
        assert!(app.metrics_store().is_some());

        let retriever = app.retriever(NamespacePolicy::Pinned(3), Some(2));
        assert_eq!(retriever.policy(), NamespacePolicy::Pinned(3));
        assert_eq!(retriever.top_k(), 2);
    }

    #[tokio::test]
    async fn test_metrics_store_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.metrics.enabled = false;
        let app = AppContext::from_config(config).await.unwrap();
        assert!(app.metrics_store().is_none());
    }

    /// Nothing listens on port 1, so every connection is refused.
    fn unreachable(dir: &std::path::Path) -> Config {
        let mut config = config(dir);
        config.vector_store.driver = VectorDriver::Qdrant;
        config.vector_store.url = "http://127.0.0.1:1".to_string();
        config.embedding.url = "http://127.0.0.1:1".to_string();
        config.embedding.timeout_secs = 2;
        config
    }

    #[tokio::test]
    async fn test_unreachable_backend_still_answers() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppContext::for_questions(unreachable(dir.path()))
            .await
            .unwrap();

        assert_eq!(app.index.name(), "qdrant");
        assert!(!app.index.health_check().await.unwrap());
        assert_eq!(app.metrics.snapshot().backend_failures, 1);

        let orchestrator = app.orchestrator(AskOptions::default()).unwrap();
        let unrouted = orchestrator.ask(AskRequest::new("hello there")).await;
        assert_eq!(unrouted.answer, NO_CONTEXT_ANSWER);

        let routed = orchestrator
            .ask(AskRequest::new("explain the refund policy"))
            .await;
        assert_eq!(routed.answer, NO_CONTEXT_ANSWER);
        assert!(routed.context.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pinned_document_answers_without_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.embedding.url = "http://127.0.0.1:1".to_string();
        let app = AppContext::for_questions(config).await.unwrap();
        let options = AskOptions {
            policy: NamespacePolicy::Pinned(99),
            ..Default::default()
        };

        let response = app
            .orchestrator(options)
            .unwrap()
            .ask(AskRequest::new("describe the document"))
            .await;
        assert_eq!(response.answer, NO_CONTEXT_ANSWER);
        assert!(response.context.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_rejects_unreachable_backend() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppContext::from_config(unreachable(dir.path())).await.is_err());
    }
}
