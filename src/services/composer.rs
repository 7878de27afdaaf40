//! Turns a question and its retrieved context into an answer.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::generator::Generator;
use super::metrics::PipelineMetrics;
use crate::error::GenerationError;
use crate::utils::{RetryConfig, with_retry};

/// Answer returned when there is no context to answer from.
pub const NO_CONTEXT_ANSWER: &str = "No relevant information found in the document.";

/// Produces answer text. Never fails: implementations fall back to
/// something the caller can show.
#[async_trait]
pub trait AnswerComposer: Send + Sync {
    async fn compose(&self, question: &str, context: &[String]) -> String;
}

/// Concatenates the retrieved spans in retrieval order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveComposer;

impl ExtractiveComposer {
    pub fn answer(context: &[String]) -> String {
        if context.is_empty() {
            NO_CONTEXT_ANSWER.to_string()
        } else {
            context.join(" ")
        }
    }
}

#[async_trait]
impl AnswerComposer for ExtractiveComposer {
    async fn compose(&self, _question: &str, context: &[String]) -> String {
        Self::answer(context)
    }
}

/// Build the generation prompt; spans are separated by a blank line.
pub fn build_prompt(question: &str, context: &[String]) -> String {
    format!(
        "Answer the question based on the context below:\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
        context.join("\n\n"),
        question
    )
}

/// Asks a [`Generator`] to answer from the context.
///
/// A failed or timed-out generation falls back to the extractive answer.
pub struct GenerativeComposer {
    generator: Arc<dyn Generator>,
    metrics: Arc<PipelineMetrics>,
    retry: RetryConfig,
    timeout: Duration,
}

impl GenerativeComposer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            metrics: Arc::new(PipelineMetrics::new()),
            retry: RetryConfig::new(1),
            timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
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
}

#[async_trait]
impl AnswerComposer for GenerativeComposer {
    async fn compose(&self, question: &str, context: &[String]) -> String {
        let prompt = build_prompt(question, context);
        let generator = self.generator.as_ref();
        let prompt = prompt.as_str();
        let limit = self.timeout;

        let reply = with_retry(&self.retry, "generate answer", move || async move {
            match timeout(limit, generator.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout),
            }
        })
        .await;

        match reply {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("generation failed, using extractive answer: {e}");
                self.metrics.record_generation_failure();
                ExtractiveComposer::answer(context)
            }
        }
    }
}
