//! Document ingestion: chunk, embed, upsert, commit.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use super::chunk_store::{ChunkStore, DocumentCatalog};
use super::chunker::TextChunker;
use super::embedding::Embedder;
use super::extract::extract_text;
use super::metrics::PipelineMetrics;
use super::vector_store::VectorIndex;
use crate::error::{EmbeddingError, IngestError, StoreError, VectorStoreError};
use crate::models::{
    Chunk, Document, DocumentId, DocumentStatus, EmbeddingRecord, IngestReport, namespace_for,
};
use crate::utils::{DocumentFormat, RetryConfig, calculate_checksum, with_retry};

/// Capabilities a chunk task needs; cloned into every task.
#[derive(Clone)]
struct ChunkSink {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunks: Arc<dyn ChunkStore>,
    retry: RetryConfig,
    timeout: Duration,
}

/// Ingests documents into the vector index and chunk store.
///
/// Each chunk is processed independently. A chunk whose embedding, upsert
/// or insert fails is skipped and counted; it never leaves a vector without
/// a chunk row or a chunk row without a vector.
pub struct Ingestor {
    chunker: TextChunker,
    sink: ChunkSink,
    catalog: Arc<dyn DocumentCatalog>,
    metrics: Arc<PipelineMetrics>,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunks: Arc<dyn ChunkStore>,
        catalog: Arc<dyn DocumentCatalog>,
    ) -> Self {
        Self {
            chunker,
            sink: ChunkSink {
                embedder,
                index,
                chunks,
                retry: RetryConfig::default(),
                timeout: Duration::from_secs(30),
            },
            catalog,
            metrics: Arc::new(PipelineMetrics::new()),
            concurrency: 4,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.sink.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sink.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Chunk and index the text of an already registered document.
    pub async fn ingest(
        &self,
        document_id: DocumentId,
        raw_text: &str,
    ) -> Result<IngestReport, IngestError> {
        if raw_text.trim().is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let windows = self.chunker.chunk(raw_text);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (chunk_index, text) in windows.into_iter().enumerate() {
            let sink = self.sink.clone();
            let semaphore = semaphore.clone();
            let chunk = Chunk {
                document_id,
                chunk_index: chunk_index as u32,
                text,
                vector_id: Chunk::generate_vector_id(),
            };

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ChunkFailure::Internal(e.to_string()))?;
                sink.store(&chunk)
                    .await
                    .map_err(|reason| ChunkFailure::At(chunk.chunk_index, reason))
            });
        }

        let mut report = IngestReport {
            document_id,
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => report.chunks_created += 1,
                Ok(Err(failure)) => {
                    tracing::warn!("document {document_id}: {failure}");
                    report.chunks_skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("document {document_id}: chunk task aborted: {e}");
                    report.chunks_skipped += 1;
                }
            }
        }

        let status = if report.chunks_created > 0 {
            DocumentStatus::Indexed
        } else {
            DocumentStatus::Failed
        };
        self.catalog.set_status(document_id, status)?;

        self.metrics.record_ingest(
            u64::from(report.chunks_created),
            u64::from(report.chunks_skipped),
        );
        tracing::info!(
            "document {document_id} {status}: {} chunks created, {} skipped",
            report.chunks_created,
            report.chunks_skipped
        );

        Ok(report)
    }

    /// Extract, register and ingest a file.
    pub async fn ingest_file(&self, path: &Path) -> Result<(Document, IngestReport), IngestError> {
        if DocumentFormat::from_path(path).is_none() {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            return Err(IngestError::UnsupportedFormat(ext));
        }

        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract_text(&owned))
            .await
            .map_err(|e| IngestError::ExtractionFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })??;

        if text.trim().is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let locator = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();

        let document = self
            .catalog
            .register(&filename, &locator, &calculate_checksum(&text))?;
        tracing::debug!("registered {} as document {}", filename, document.id);

        let report = self.ingest(document.id, &text).await?;
        let document = self.catalog.get(document.id)?.unwrap_or(document);

        Ok((document, report))
    }

    /// Remove a document's vectors, then the document and its chunks.
    pub async fn delete_document(&self, document_id: DocumentId) -> Result<(), IngestError> {
        if self.catalog.get(document_id)?.is_none() {
            return Err(StoreError::DocumentNotFound(document_id).into());
        }

        let namespace = namespace_for(document_id);
        match timeout(self.sink.timeout, self.sink.index.delete_namespace(&namespace)).await {
            Ok(result) => result?,
            Err(_) => return Err(VectorStoreError::Timeout.into()),
        }

        self.catalog.delete(document_id)?;
        tracing::info!("deleted document {document_id}");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum ChunkFailure {
    #[error("chunk {0} skipped: {1}")]
    At(u32, String),

    #[error("chunk skipped: {0}")]
    Internal(String),
}

impl ChunkSink {
    /// Embed, upsert, then commit one chunk. The vector is removed again if
    /// the chunk row cannot be written.
    async fn store(&self, chunk: &Chunk) -> Result<(), String> {
        let embedder = self.embedder.as_ref();
        let text = chunk.text.as_str();
        let limit = self.timeout;

        let vector = with_retry(&self.retry, "embed chunk", move || async move {
            match timeout(limit, embedder.embed(text)).await {
                Ok(result) => result,
                Err(_) => Err(EmbeddingError::Timeout),
            }
        })
        .await
        .map_err(|e| format!("embedding failed: {e}"))?;

        let record = EmbeddingRecord::for_chunk(chunk, vector);
        let namespace = record.namespace.clone();

        let index = self.index.as_ref();
        with_retry(&self.retry, "upsert vector", || {
            let record = record.clone();
            async move {
                match timeout(limit, index.upsert(record)).await {
                    Ok(result) => result,
                    Err(_) => Err(VectorStoreError::Timeout),
                }
            }
        })
        .await
        .map_err(|e| format!("upsert failed: {e}"))?;

        let chunks = self.chunks.clone();
        let row = chunk.clone();
        let inserted = match tokio::task::spawn_blocking(move || chunks.insert_chunk(&row)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(e) = inserted {
            match timeout(limit, self.index.delete(&chunk.vector_id, &namespace)).await {
                Ok(Ok(())) => {}
                Ok(Err(cleanup)) => tracing::warn!(
                    "could not remove vector {} after failed insert: {cleanup}",
                    chunk.vector_id
                ),
                Err(_) => tracing::warn!(
                    "removing vector {} after failed insert timed out",
                    chunk.vector_id
                ),
            }
            return Err(format!("chunk insert failed: {e}"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chunk_store::SqliteStore;
    use crate::services::vector_store::MemoryIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails for any text containing `poison`.
    struct PickyEmbedder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Embedder for PickyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("poison") {
                Err(EmbeddingError::InvalidResponse("rejected".to_string()))
            } else {
                Ok(vec![text.len() as f32, 1.0])
            }
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        index: Arc<MemoryIndex>,
        embedder: Arc<PickyEmbedder>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(SqliteStore::open_in_memory().unwrap()),
                index: Arc::new(MemoryIndex::new()),
                embedder: Arc::new(PickyEmbedder {
                    calls: AtomicU32::new(0),
                }),
            }
        }

        fn ingestor(&self, size: usize, overlap: usize) -> Ingestor {
            Ingestor::new(
                TextChunker::new(size, overlap).unwrap(),
                self.embedder.clone(),
                self.index.clone(),
                self.store.clone(),
                self.store.clone(),
            )
            .with_retry(RetryConfig::new(1))
        }
    }

    #[tokio::test]
    async fn test_ingest_creates_paired_chunks() {
        let fx = Fixture::new();
        let doc = fx.store.register("a.txt", "a", "x").unwrap();
        let text = "abcdefghij".repeat(5);

        let report = fx.ingestor(20, 5).ingest(doc.id, &text).await.unwrap();

        assert_eq!(report.chunks_created, 3);
        assert_eq!(report.chunks_skipped, 0);
        assert_eq!(fx.index.count().await.unwrap(), 3);

        let chunks = fx.store.chunks_for_document(doc.id).unwrap();
        let indices: Vec<_> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(
            fx.store.get(doc.id).unwrap().unwrap().status,
            DocumentStatus::Indexed
        );
    }

    #[tokio::test]
    async fn test_failed_embedding_is_skipped_and_unpaired() {
        let fx = Fixture::new();
        let doc = fx.store.register("a.txt", "a", "x").unwrap();
        // windows of 10 without overlap; the second one is poisoned
        let text = "aaaaaaaaaapoison....bbbbbbbbbb";

        let report = fx.ingestor(10, 0).ingest(doc.id, text).await.unwrap();

        assert_eq!(report.chunks_created, 2);
        assert_eq!(report.chunks_skipped, 1);
        assert_eq!(fx.index.count().await.unwrap(), 2);
        let texts: Vec<_> = fx
            .store
            .chunks_for_document(doc.id)
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["aaaaaaaaaa", "bbbbbbbbbb"]);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_marks_document_failed() {
        let fx = Fixture::new();
        let doc = fx.store.register("a.txt", "a", "x").unwrap();

        let report = fx.ingestor(50, 0).ingest(doc.id, "poison").await.unwrap();

        assert_eq!(report.chunks_created, 0);
        assert_eq!(report.chunks_skipped, 1);
        assert_eq!(
            fx.store.get(doc.id).unwrap().unwrap().status,
            DocumentStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_failed_insert_removes_vector() {
        let fx = Fixture::new();
        // no registered document, so every chunk insert violates the foreign key
        let report = fx.ingestor(10, 0).ingest(404, "some text").await;

        assert!(matches!(
            report,
            Err(IngestError::Store(StoreError::DocumentNotFound(404)))
        ));
        assert_eq!(fx.index.count().await.unwrap(), 0);
        assert_eq!(fx.store.count_chunks().unwrap(), 0);
    }

    /// Memory index whose single-vector delete never finishes.
    struct StuckDeleteIndex(MemoryIndex);

    #[async_trait]
    impl VectorIndex for StuckDeleteIndex {
        async fn health_check(&self) -> Result<bool, VectorStoreError> {
            Ok(true)
        }

        async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStoreError> {
            self.0.upsert(record).await
        }

        async fn query(
            &self,
            vector: &[f32],
            k: usize,
            namespace: &str,
            include_metadata: bool,
        ) -> Result<Vec<crate::models::VectorHit>, VectorStoreError> {
            self.0.query(vector, k, namespace, include_metadata).await
        }

        async fn delete(&self, _id: &str, _namespace: &str) -> Result<(), VectorStoreError> {
            std::future::pending().await
        }

        async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorStoreError> {
            self.0.delete_namespace(namespace).await
        }

        async fn count(&self) -> Result<u64, VectorStoreError> {
            self.0.count().await
        }

        fn name(&self) -> &str {
            "stuck"
        }
    }

    #[tokio::test]
    async fn test_cleanup_delete_is_bounded_by_timeout() {
        let fx = Fixture::new();
        let ingestor = Ingestor::new(
            TextChunker::new(10, 0).unwrap(),
            fx.embedder.clone(),
            Arc::new(StuckDeleteIndex(MemoryIndex::new())),
            fx.store.clone(),
            fx.store.clone(),
        )
        .with_retry(RetryConfig::new(1))
        .with_timeout(Duration::from_millis(50));

        // unregistered document: the chunk insert fails and cleanup runs
        let result =
            tokio::time::timeout(Duration::from_secs(5), ingestor.ingest(404, "some text")).await;

        assert!(matches!(
            result,
            Ok(Err(IngestError::Store(StoreError::DocumentNotFound(404))))
        ));
        assert_eq!(fx.store.count_chunks().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reingest_gives_same_chunk_layout() {
        let fx = Fixture::new();
        let first = fx.store.register("a.txt", "a", "x").unwrap();
        let second = fx.store.register("a-copy.txt", "a", "x").unwrap();
        let text = "The warranty covers parts and labour for a year. ".repeat(4);

        let ingestor = fx.ingestor(30, 8);
        ingestor.ingest(first.id, &text).await.unwrap();
        ingestor.ingest(second.id, &text).await.unwrap();

        let layout = |id| {
            fx.store
                .chunks_for_document(id)
                .unwrap()
                .into_iter()
                .map(|c| (c.chunk_index, c.text))
                .collect::<Vec<_>>()
        };
        let a = layout(first.id);
        assert!(a.len() > 1);
        assert_eq!(a, layout(second.id));
    }

    #[test]
    fn test_chunk_failure_messages() {
        assert_eq!(
            ChunkFailure::At(3, "embedding failed: timeout".to_string()).to_string(),
            "chunk 3 skipped: embedding failed: timeout"
        );
        assert_eq!(
            ChunkFailure::Internal("semaphore closed".to_string()).to_string(),
            "chunk skipped: semaphore closed"
        );
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let fx = Fixture::new();
        let result = fx.ingestor(10, 0).ingest(1, " \n\t ").await;
        assert!(matches!(result, Err(IngestError::EmptyDocument)));
        assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ingest_file_registers_document() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.md");
        std::fs::write(&path, "# Policy\n\nRefunds within 30 days.").unwrap();

        let (document, report) = fx.ingestor(800, 100).ingest_file(&path).await.unwrap();

        assert_eq!(document.filename, "policy.md");
        assert_eq!(document.status, DocumentStatus::Indexed);
        assert_eq!(document.checksum.len(), 64);
        assert_eq!(report.chunks_created, 1);
        assert_eq!(fx.store.latest().unwrap().map(|d| d.id), Some(document.id));
    }

    #[tokio::test]
    async fn test_ingest_file_rejects_before_registering() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        let binary = dir.path().join("image.png");
        std::fs::write(&empty, "   ").unwrap();
        std::fs::write(&binary, [0u8, 1, 2]).unwrap();

        let ingestor = fx.ingestor(10, 0);
        assert!(matches!(
            ingestor.ingest_file(&empty).await,
            Err(IngestError::EmptyDocument)
        ));
        assert!(matches!(
            ingestor.ingest_file(&binary).await,
            Err(IngestError::UnsupportedFormat(_))
        ));
        assert_eq!(fx.store.count_documents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_document_removes_namespace_and_chunks() {
        let fx = Fixture::new();
        let keep = fx.store.register("keep.txt", "k", "k").unwrap();
        let doc = fx.store.register("a.txt", "a", "x").unwrap();
        let ingestor = fx.ingestor(10, 0);
        ingestor.ingest(keep.id, "keep this").await.unwrap();
        ingestor.ingest(doc.id, "aaaaaaaaaabbbbbbbbbb").await.unwrap();

        ingestor.delete_document(doc.id).await.unwrap();

        assert!(fx.store.get(doc.id).unwrap().is_none());
        assert!(fx.store.chunks_for_document(doc.id).unwrap().is_empty());
        assert_eq!(fx.index.count().await.unwrap(), 1);
        assert!(matches!(
            ingestor.delete_document(doc.id).await,
            Err(IngestError::Store(StoreError::DocumentNotFound(_)))
        ));
    }
}
