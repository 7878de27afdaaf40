use anyhow::{Context, Result};
use clap::Subcommand;

use crate::app::AppContext;
use crate::cli::output::get_formatter;
use crate::models::{Config, DocumentId, OutputFormat};
use crate::services::{ChunkStore, DocumentCatalog, SqliteStore};

#[derive(Debug, Subcommand)]
pub enum DocumentsCommand {
    /// List registered documents, newest first
    List,

    /// Show a document and its chunks
    Show {
        #[arg(required = true)]
        id: DocumentId,
    },

    /// Delete a document, its chunks and its vectors
    Delete {
        #[arg(required = true)]
        id: DocumentId,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn handle_documents(
    cmd: DocumentsCommand,
    config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match cmd {
        DocumentsCommand::List => handle_list(&config, format),
        DocumentsCommand::Show { id } => handle_show(&config, id, format),
        DocumentsCommand::Delete { id, yes } => handle_delete(config, id, yes, format, verbose).await,
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.store.resolved_path();
    SqliteStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn handle_list(config: &Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let documents = open_store(config)?.list()?;
    print!("{}", formatter.format_documents(&documents));
    Ok(())
}

fn handle_show(config: &Config, id: DocumentId, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let store = open_store(config)?;

    let document = store
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("document {id} not found"))?;
    let chunks = store.chunks_for_document(id)?;

    print!("{}", formatter.format_document(&document, &chunks));
    Ok(())
}

async fn handle_delete(
    config: Config,
    id: DocumentId,
    yes: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let app = AppContext::from_config(config)
        .await
        .context("failed to initialize pipeline")?;

    let document = app
        .store
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("document {id} not found"))?;

    if !yes {
        println!(
            "This will delete document {} ({}) and all of its chunks. Continue? [y/N]",
            document.id, document.filename
        );
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    if verbose {
        eprintln!(
            "Removing namespace {} from {}",
            document.namespace(),
            app.index.name()
        );
    }

    app.ingestor()?
        .delete_document(id)
        .await
        .with_context(|| format!("failed to delete document {id}"))?;

    println!(
        "{}",
        formatter.format_message(&format!("Deleted document {} ({})", id, document.filename))
    );
    Ok(())
}
