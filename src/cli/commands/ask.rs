use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::app::{AppContext, AskOptions};
use crate::cli::output::get_formatter;
use crate::models::{AskRequest, ComposerKind, Config, DocumentId, OutputFormat};
use crate::services::{AskRecord, DocumentCatalog, MetricsSnapshot, NamespacePolicy};

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer")]
    pub question: String,

    #[arg(
        long,
        short = 'd',
        help = "Answer from this document instead of the latest upload"
    )]
    pub document: Option<DocumentId>,

    #[arg(long, short = 'k', help = "Number of chunks to retrieve")]
    pub k: Option<usize>,

    #[arg(long, short = 's', help = "Answer strategy: extractive or generative")]
    pub strategy: Option<ComposerKind>,
}

pub async fn handle_ask(
    args: AskArgs,
    config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let question = args.question.trim();
    if question.is_empty() {
        anyhow::bail!("question cannot be empty");
    }
    if args.k == Some(0) {
        anyhow::bail!("--k must be at least 1");
    }

    let formatter = get_formatter(format);
    let app = AppContext::for_questions(config)
        .await
        .context("failed to initialize pipeline")?;

    let policy = match args.document {
        Some(id) => pinned_policy(app.store.as_ref(), id),
        None => NamespacePolicy::LatestDocument,
    };

    let options = AskOptions {
        policy,
        top_k: args.k,
        strategy: args.strategy,
    };
    let orchestrator = app
        .orchestrator(options)
        .context("failed to build answer pipeline")?;

    if verbose {
        eprintln!("Question: \"{question}\"");
        eprintln!("  Policy: {policy:?}");
        eprintln!(
            "  Strategy: {}",
            args.strategy.unwrap_or(app.config.answer.strategy)
        );
    }

    let before = app.metrics.snapshot();
    let start_time = Instant::now();
    let response = orchestrator.ask(AskRequest::new(question)).await;
    let latency_ms = start_time.elapsed().as_millis() as u64;

    if let Some(store) = app.metrics_store() {
        store.record(ask_record(
            before,
            app.metrics.snapshot(),
            response.context.len(),
            latency_ms,
        ));
        store.cleanup(app.config.metrics.retention_days);
    }

    print!("{}", formatter.format_answer(&response));

    if verbose {
        eprintln!("\nAnswered in {latency_ms}ms");
    }

    Ok(())
}

/// Pin retrieval to `id`. An unknown document leaves the context empty.
fn pinned_policy(catalog: &dyn DocumentCatalog, id: DocumentId) -> NamespacePolicy {
    match catalog.get(id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            eprintln!("Warning: document {id} not found, answering without document context.");
        }
        Err(e) => tracing::warn!("could not look up document {id}: {e}"),
    }
    NamespacePolicy::Pinned(id)
}

/// Summarize one ask from the counter movement it caused.
fn ask_record(
    before: MetricsSnapshot,
    after: MetricsSnapshot,
    retrieved: usize,
    latency_ms: u64,
) -> AskRecord {
    let degraded = after.embed_failures > before.embed_failures
        || after.backend_failures > before.backend_failures
        || after.generation_failures > before.generation_failures;

    AskRecord {
        latency_ms,
        retrieved: retrieved as u64,
        dropped: after.dropped_hits - before.dropped_hits,
        success: !degraded,
    }
}
