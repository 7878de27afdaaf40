//! Nearest-neighbour retrieval of chunk text for a question.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::chunk_store::{ChunkStore, DocumentCatalog};
use super::embedding::Embedder;
use super::metrics::PipelineMetrics;
use super::vector_store::VectorIndex;
use crate::error::StoreError;
use crate::models::{DEFAULT_TOP_K, Document, DocumentId, VectorHit, namespace_for};

/// Which document a question is searched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamespacePolicy {
    /// The most recently uploaded document.
    #[default]
    LatestDocument,
    /// A fixed document.
    Pinned(DocumentId),
}

/// Embeds a question, queries one namespace and resolves hits to text.
///
/// Retrieval never fails: every error degrades to an empty or shorter
/// context and is logged and counted in [`PipelineMetrics`].
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunks: Arc<dyn ChunkStore>,
    catalog: Arc<dyn DocumentCatalog>,
    metrics: Arc<PipelineMetrics>,
    policy: NamespacePolicy,
    top_k: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunks: Arc<dyn ChunkStore>,
        catalog: Arc<dyn DocumentCatalog>,
    ) -> Self {
        Self {
            embedder,
            index,
            chunks,
            catalog,
            metrics: Arc::new(PipelineMetrics::new()),
            policy: NamespacePolicy::default(),
            top_k: DEFAULT_TOP_K as usize,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: NamespacePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> NamespacePolicy {
        self.policy
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve up to the configured `top_k` chunk texts, best first.
    pub async fn retrieve(&self, question: &str) -> Vec<String> {
        self.retrieve_with_k(question, self.top_k).await
    }

    pub async fn retrieve_with_k(&self, question: &str, k: usize) -> Vec<String> {
        self.metrics.record_retrieval();

        if question.trim().is_empty() || k == 0 {
            return Vec::new();
        }

        let vector = match timeout(self.timeout, self.embedder.embed(question)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                tracing::warn!("question embedding failed, answering without context: {e}");
                self.metrics.record_embed_failure();
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(
                    "question embedding timed out after {:?}, answering without context",
                    self.timeout
                );
                self.metrics.record_embed_failure();
                return Vec::new();
            }
        };

        let Some(namespace) = self.resolve_namespace().await else {
            return Vec::new();
        };

        let hits = match timeout(self.timeout, self.index.query(&vector, k, &namespace, true)).await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                tracing::warn!("vector query on {} failed: {e}", self.index.name());
                self.metrics.record_backend_failure();
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(
                    "vector query on {} timed out after {:?}",
                    self.index.name(),
                    self.timeout
                );
                self.metrics.record_backend_failure();
                return Vec::new();
            }
        };

        self.resolve_hits(hits).await
    }

    async fn resolve_namespace(&self) -> Option<String> {
        match self.policy {
            NamespacePolicy::Pinned(id) => Some(namespace_for(id)),
            NamespacePolicy::LatestDocument => match self.latest_document().await {
                Ok(Some(document)) => Some(document.namespace()),
                Ok(None) => {
                    tracing::debug!("no documents uploaded, nothing to retrieve");
                    None
                }
                Err(e) => {
                    tracing::warn!("document catalog unavailable: {e}");
                    self.metrics.record_backend_failure();
                    None
                }
            },
        }
    }

    async fn latest_document(&self) -> Result<Option<Document>, StoreError> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || catalog.latest())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Map hits to chunk text in hit order, dropping hits without a chunk.
    async fn resolve_hits(&self, hits: Vec<VectorHit>) -> Vec<String> {
        let chunks = self.chunks.clone();
        let hit_count = hits.len() as u64;
        let lookup = tokio::task::spawn_blocking(move || {
            let mut context = Vec::with_capacity(hits.len());
            for hit in hits {
                match chunks.find_by_vector_id(&hit.id) {
                    Ok(Some(chunk)) => context.push(chunk.text),
                    Ok(None) => {
                        tracing::debug!(
                            "dropping hit {} (score {:.4}): no chunk stored",
                            hit.id,
                            hit.score
                        );
                    }
                    Err(e) => tracing::warn!("chunk lookup for {} failed: {e}", hit.id),
                }
            }
            context
        })
        .await;

        let context = lookup.unwrap_or_else(|e| {
            tracing::warn!("chunk lookup aborted: {e}");
            Vec::new()
        });

        let dropped = hit_count - context.len() as u64;
        if dropped > 0 {
            self.metrics.record_dropped_hits(dropped);
        }
        context
    }
}
