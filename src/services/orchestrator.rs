//! Route, optionally retrieve, then answer.

use std::sync::Arc;

use super::composer::AnswerComposer;
use super::metrics::PipelineMetrics;
use super::retriever::Retriever;
use super::router::Classifier;
use crate::models::{AskRequest, AskResponse, QueryState, Stage};

/// Runs one question through the pipeline as an explicit state machine.
///
/// Holds only shared, read-only capabilities, so concurrent calls to
/// [`Orchestrator::ask`] do not interfere.
pub struct Orchestrator {
    router: Arc<dyn Classifier>,
    retriever: Arc<Retriever>,
    composer: Arc<dyn AnswerComposer>,
    metrics: Arc<PipelineMetrics>,
}

impl Orchestrator {
    pub fn new(
        router: Arc<dyn Classifier>,
        retriever: Arc<Retriever>,
        composer: Arc<dyn AnswerComposer>,
    ) -> Self {
        Self {
            router,
            retriever,
            composer,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Advance `state` by one transition. `End` maps to itself.
    pub async fn step(&self, state: QueryState) -> QueryState {
        let next = match state.stage {
            Stage::Start => {
                let needs_retrieval = self.router.needs_retrieval(&state.question);
                state.routed(needs_retrieval)
            }
            Stage::Routed if state.needs_retrieval => {
                let context = self.retriever.retrieve(&state.question).await;
                state.retrieved(context)
            }
            Stage::Routed | Stage::Retrieved => {
                let answer = self.composer.compose(&state.question, &state.context).await;
                state.answered(answer)
            }
            Stage::Answered => state.finished(),
            Stage::End => return state,
        };

        tracing::debug!(
            stage = %next.stage,
            needs_retrieval = next.needs_retrieval,
            context = next.context.len(),
            "query state transition"
        );
        next
    }

    /// Answer a question in one linear pass.
    pub async fn ask(&self, request: AskRequest) -> AskResponse {
        self.metrics.record_ask();

        let mut state = QueryState::start(request.question);
        while !state.is_terminal() {
            state = self.step(state).await;
        }
        state.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::models::{Chunk, EmbeddingRecord};
    use crate::services::chunk_store::{ChunkStore, DocumentCatalog, SqliteStore};
    use crate::services::composer::{ExtractiveComposer, NO_CONTEXT_ANSWER};
    use crate::services::embedding::Embedder;
    use crate::services::router::{AlwaysRetrieve, KeywordRouter};
    use crate::services::vector_store::{MemoryIndex, VectorIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder(AtomicUsize);

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    async fn orchestrator(router: Arc<dyn Classifier>) -> (Orchestrator, Arc<CountingEmbedder>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let index = Arc::new(MemoryIndex::new());
        let doc = store.register("policy.txt", "policy.txt", "x").unwrap();
        let chunk = Chunk {
            document_id: doc.id,
            chunk_index: 0,
            text: "Refunds are issued within 30 days.".to_string(),
            vector_id: Chunk::generate_vector_id(),
        };
        index
            .upsert(EmbeddingRecord::for_chunk(&chunk, vec![1.0, 0.0]))
            .await
            .unwrap();
        store.insert_chunk(&chunk).unwrap();

        let embedder = Arc::new(CountingEmbedder(AtomicUsize::new(0)));
        let retriever = Retriever::new(embedder.clone(), index, store.clone(), store);
        let orchestrator =
            Orchestrator::new(router, Arc::new(retriever), Arc::new(ExtractiveComposer));
        (orchestrator, embedder)
    }

    #[tokio::test]
    async fn test_step_sequence_with_retrieval() {
        let (orchestrator, _) = orchestrator(Arc::new(KeywordRouter::default())).await;

        let mut stages = Vec::new();
        let mut state = QueryState::start("What does the policy say?");
        while !state.is_terminal() {
            state = orchestrator.step(state).await;
            stages.push(state.stage);
        }

        assert_eq!(
            stages,
            vec![Stage::Routed, Stage::Retrieved, Stage::Answered, Stage::End]
        );
        assert_eq!(state.answer, "Refunds are issued within 30 days.");
    }

    #[tokio::test]
    async fn test_unrouted_question_skips_retrieval() {
        let (orchestrator, embedder) = orchestrator(Arc::new(KeywordRouter::default())).await;

        let response = orchestrator.ask(AskRequest::new("hello there")).await;

        assert_eq!(response.answer, NO_CONTEXT_ANSWER);
        assert!(response.context.is_empty());
        assert_eq!(embedder.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_end_is_terminal() {
        let (orchestrator, _) = orchestrator(Arc::new(AlwaysRetrieve)).await;
        let done = QueryState::start("q").routed(false).answered("a".into()).finished();
        let again = orchestrator.step(done.clone()).await;
        assert_eq!(again, done);
    }

    #[tokio::test]
    async fn test_concurrent_asks_are_independent() {
        let (orchestrator, _) = orchestrator(Arc::new(KeywordRouter::default())).await;
        let orchestrator = Arc::new(orchestrator);

        let a = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.ask(AskRequest::new("explain the refund policy")).await }
        });
        let b = tokio::spawn({
            let o = orchestrator.clone();
            async move { o.ask(AskRequest::new("good morning")).await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.context.len(), 1);
        assert!(b.context.is_empty());
        assert_eq!(b.answer, NO_CONTEXT_ANSWER);
    }
}
