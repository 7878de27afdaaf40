//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

use crate::app::AppContext;
use crate::cli::output::{IngestFileResult, IngestSummary, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::utils::collect_files;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

pub async fn handle_ingest(
    args: IngestArgs,
    config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let mut files = Vec::new();
    for path in &args.paths {
        if !path.exists() {
            anyhow::bail!("path does not exist: {}", path.display());
        }
        files.extend(collect_files(path));
    }

    if files.is_empty() {
        println!(
            "{}",
            formatter.format_message("No supported files found (pdf, txt, md).")
        );
        return Ok(());
    }

    if verbose {
        eprintln!("Found {} files to ingest", files.len());
    }

    let app = AppContext::from_config(config)
        .await
        .context("failed to initialize pipeline")?;
    let ingestor = app.ingestor().context("failed to build ingestor")?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );

    let mut summary = IngestSummary::default();

    for file in &files {
        pb.set_message(
            file.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let result = match ingestor.ingest_file(file).await {
            Ok((document, report)) => {
                if verbose {
                    pb.println(format!(
                        "{} -> document {} ({})",
                        file.display(),
                        document.id,
                        document.status
                    ));
                }
                IngestFileResult {
                    path: file.display().to_string(),
                    document_id: Some(document.id),
                    chunks_created: report.chunks_created,
                    chunks_skipped: report.chunks_skipped,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("failed to ingest {}: {e}", file.display());
                IngestFileResult {
                    path: file.display().to_string(),
                    document_id: None,
                    chunks_created: 0,
                    chunks_skipped: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        summary.files.push(result);
        pb.inc(1);
    }

    pb.finish_and_clear();
    summary.duration_ms = start_time.elapsed().as_millis() as u64;
    summary.counters = app.metrics.snapshot();
    print!("{}", formatter.format_ingest(&summary));

    if summary.failed() == summary.files.len() {
        anyhow::bail!("no documents were ingested");
    }

    Ok(())
}
