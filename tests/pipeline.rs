//! End-to-end tests for ingestion and question answering.
//!
//! Everything runs in-process: a bag-of-words embedder, the in-memory
//! vector index and an in-memory SQLite catalog.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use docqa::error::{EmbeddingError, GenerationError};
use docqa::models::{AskRequest, ChunkMetadata, DocumentId, DocumentStatus, EmbeddingRecord};
use docqa::services::{
    AnswerComposer, ChunkStore, DocumentCatalog, Embedder, ExtractiveComposer, GenerativeComposer,
    Generator, Ingestor, KeywordRouter, MemoryIndex, NO_CONTEXT_ANSWER, NamespacePolicy,
    Orchestrator, PipelineMetrics, Retriever, SqliteStore, TextChunker, VectorIndex,
};
use docqa::utils::RetryConfig;

const VOCAB: [&str; 4] = ["refund", "shipping", "warranty", "privacy"];
const WINDOW: usize = 40;

// ─── Test Embedder ──────────────────────────────────────────────────

/// Counts vocabulary words; a small constant component keeps every vector
/// non-zero. Texts containing "poison" fail.
struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        if lower.contains("poison") {
            return Err(EmbeddingError::InvalidResponse("poisoned chunk".to_string()));
        }

        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut vector: Vec<f32> = VOCAB
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect();
        vector.push(0.01);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        VOCAB.len() + 1
    }
}

// ─── Test Generators ────────────────────────────────────────────────

struct RecordingGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

struct UnavailableGenerator;

#[async_trait]
impl Generator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::ServerError("503 Service Unavailable".to_string()))
    }
}

// ─── Harness ────────────────────────────────────────────────────────

struct Harness {
    embedder: Arc<BagOfWordsEmbedder>,
    index: Arc<MemoryIndex>,
    store: Arc<SqliteStore>,
    metrics: Arc<PipelineMetrics>,
}

impl Harness {
    fn new() -> Self {
        Self {
            embedder: Arc::new(BagOfWordsEmbedder::new()),
            index: Arc::new(MemoryIndex::new()),
            store: Arc::new(SqliteStore::open_in_memory().unwrap()),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            TextChunker::new(WINDOW, 0).unwrap(),
            self.embedder.clone(),
            self.index.clone(),
            self.store.clone(),
            self.store.clone(),
        )
        .with_concurrency(2)
        .with_retry(RetryConfig::new(1))
        .with_metrics(self.metrics.clone())
    }

    /// Register a document whose chunks are exactly `segments`.
    async fn ingest(&self, filename: &str, segments: &[&str]) -> DocumentId {
        let text = window_text(segments);
        let document = self
            .store
            .register(filename, &format!("/docs/{filename}"), "checksum")
            .unwrap();
        self.ingestor().ingest(document.id, &text).await.unwrap();
        document.id
    }

    fn orchestrator(
        &self,
        policy: NamespacePolicy,
        top_k: usize,
        composer: Arc<dyn AnswerComposer>,
    ) -> Orchestrator {
        let retriever = Retriever::new(
            self.embedder.clone(),
            self.index.clone(),
            self.store.clone(),
            self.store.clone(),
        )
        .with_policy(policy)
        .with_top_k(top_k)
        .with_metrics(self.metrics.clone());

        Orchestrator::new(
            Arc::new(KeywordRouter::default()),
            Arc::new(retriever),
            composer,
        )
        .with_metrics(self.metrics.clone())
    }

    fn extractive(&self, policy: NamespacePolicy, top_k: usize) -> Orchestrator {
        self.orchestrator(policy, top_k, Arc::new(ExtractiveComposer))
    }
}

/// Pad each segment to one chunk window.
fn window_text(segments: &[&str]) -> String {
    segments.iter().map(|s| format!("{s:<width$}", width = WINDOW)).collect()
}

const POLICY_SEGMENTS: [&str; 4] = [
    "shipping takes five business days",
    "refund after shipping and warranty",
    "warranty covers parts for a year",
    "refund within thirty days",
];

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ask_returns_ranked_context() {
    let harness = Harness::new();
    harness.ingest("policy.txt", &POLICY_SEGMENTS).await;

    let response = harness
        .extractive(NamespacePolicy::LatestDocument, 2)
        .ask(AskRequest::new("Explain the refund policy"))
        .await;

    assert_eq!(response.context.len(), 2);
    assert!(response.context[0].contains("refund within thirty days"));
    assert!(response.context[1].contains("refund after shipping"));
    assert_eq!(response.answer, response.context.join(" "));
}

#[tokio::test]
async fn test_unrouted_question_skips_retrieval() {
    let harness = Harness::new();
    harness.ingest("policy.txt", &POLICY_SEGMENTS).await;
    let calls_after_ingest = harness.embedder.calls();

    let response = harness
        .extractive(NamespacePolicy::LatestDocument, 5)
        .ask(AskRequest::new("hello there"))
        .await;

    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert!(response.context.is_empty());
    assert_eq!(harness.embedder.calls(), calls_after_ingest);
    assert_eq!(harness.metrics.snapshot().retrievals, 0);
}

#[tokio::test]
async fn test_no_documents_gives_fallback_answer() {
    let harness = Harness::new();

    let response = harness
        .extractive(NamespacePolicy::LatestDocument, 5)
        .ask(AskRequest::new("What does the document say about refunds?"))
        .await;

    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert!(response.context.is_empty());
}

#[tokio::test]
async fn test_latest_document_scopes_retrieval() {
    let harness = Harness::new();
    let first = harness.ingest("refunds.txt", &POLICY_SEGMENTS).await;
    harness
        .ingest(
            "privacy.txt",
            &["privacy notice for customers", "we never sell privacy data"],
        )
        .await;

    let latest = harness
        .extractive(NamespacePolicy::LatestDocument, 5)
        .ask(AskRequest::new("Explain the refund policy"))
        .await;
    assert_eq!(latest.context.len(), 2);
    assert!(latest.context.iter().all(|c| c.contains("privacy")));

    let pinned = harness
        .extractive(NamespacePolicy::Pinned(first), 1)
        .ask(AskRequest::new("Explain the refund policy"))
        .await;
    assert_eq!(pinned.context.len(), 1);
    assert!(pinned.context[0].contains("thirty days"));
}

#[tokio::test]
async fn test_failed_chunks_are_skipped_and_counted() {
    let harness = Harness::new();
    let document = harness
        .store
        .register("mixed.txt", "/docs/mixed.txt", "checksum")
        .unwrap();
    let text = window_text(&[
        "refund within thirty days",
        "poison pill in this window",
        "warranty covers parts for a year",
    ]);

    let report = harness
        .ingestor()
        .ingest(document.id, &text)
        .await
        .unwrap();

    assert_eq!(report.chunks_created, 2);
    assert_eq!(report.chunks_skipped, 1);
    assert_eq!(harness.index.count().await.unwrap(), 2);

    let chunks = harness.store.chunks_for_document(document.id).unwrap();
    let indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 2]);

    let stored = harness.store.get(document.id).unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Indexed);

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.chunks_created, 2);
    assert_eq!(snapshot.chunks_skipped, 1);
}

#[tokio::test]
async fn test_all_chunks_failing_marks_document_failed() {
    let harness = Harness::new();
    let document = harness
        .store
        .register("bad.txt", "/docs/bad.txt", "checksum")
        .unwrap();

    let report = harness
        .ingestor()
        .ingest(document.id, &window_text(&["poison", "more poison"]))
        .await
        .unwrap();

    assert_eq!(report.chunks_created, 0);
    assert_eq!(report.chunks_skipped, 2);
    assert_eq!(harness.index.count().await.unwrap(), 0);
    let stored = harness.store.get(document.id).unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
}

#[tokio::test]
async fn test_orphaned_vector_is_dropped_from_context() {
    let harness = Harness::new();
    let id = harness.ingest("policy.txt", &POLICY_SEGMENTS).await;

    // A vector without a committed chunk that outranks everything else.
    harness
        .index
        .upsert(EmbeddingRecord {
            vector_id: "orphan".to_string(),
            vector: vec![5.0, 0.0, 0.0, 0.0, 0.05],
            namespace: docqa::models::namespace_for(id),
            metadata: ChunkMetadata {
                document_id: id,
                chunk_index: 99,
            },
        })
        .await
        .unwrap();

    let response = harness
        .extractive(NamespacePolicy::LatestDocument, 2)
        .ask(AskRequest::new("Explain the refund policy"))
        .await;

    assert_eq!(response.context.len(), 1);
    assert!(response.context[0].contains("refund"));
    assert_eq!(harness.metrics.snapshot().dropped_hits, 1);
}

#[tokio::test]
async fn test_delete_document_removes_vectors_and_chunks() {
    let harness = Harness::new();
    let first = harness.ingest("refunds.txt", &POLICY_SEGMENTS).await;
    let second = harness
        .ingest("privacy.txt", &["privacy notice for customers"])
        .await;
    assert_eq!(harness.index.count().await.unwrap(), 5);

    harness.ingestor().delete_document(first).await.unwrap();

    assert!(harness.store.get(first).unwrap().is_none());
    assert!(harness.store.chunks_for_document(first).unwrap().is_empty());
    assert_eq!(harness.index.count().await.unwrap(), 1);
    assert_eq!(harness.store.latest().unwrap().unwrap().id, second);

    let response = harness
        .extractive(NamespacePolicy::Pinned(first), 5)
        .ask(AskRequest::new("Explain the refund policy"))
        .await;
    assert_eq!(response.answer, NO_CONTEXT_ANSWER);

    assert!(harness.ingestor().delete_document(first).await.is_err());
}

#[tokio::test]
async fn test_generative_answer_is_trimmed() {
    let harness = Harness::new();
    harness.ingest("policy.txt", &POLICY_SEGMENTS).await;

    let generator = Arc::new(RecordingGenerator {
        reply: "  Refunds are accepted within thirty days.\n".to_string(),
        prompts: Mutex::new(Vec::new()),
    });
    let composer = GenerativeComposer::new(generator.clone()).with_metrics(harness.metrics.clone());

    let response = harness
        .orchestrator(NamespacePolicy::LatestDocument, 1, Arc::new(composer))
        .ask(AskRequest::new("Explain the refund policy"))
        .await;

    assert_eq!(response.answer, "Refunds are accepted within thirty days.");
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Explain the refund policy"));
    assert!(prompts[0].contains("refund within thirty days"));
}

#[tokio::test]
async fn test_generator_failure_falls_back_to_extractive() {
    let harness = Harness::new();
    harness.ingest("policy.txt", &POLICY_SEGMENTS).await;

    let composer =
        GenerativeComposer::new(Arc::new(UnavailableGenerator)).with_metrics(harness.metrics.clone());

    let response = harness
        .orchestrator(NamespacePolicy::LatestDocument, 2, Arc::new(composer))
        .ask(AskRequest::new("Explain the refund policy"))
        .await;

    assert_eq!(response.context.len(), 2);
    assert_eq!(response.answer, response.context.join(" "));
    assert_eq!(harness.metrics.snapshot().generation_failures, 1);
}
