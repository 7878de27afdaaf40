use anyhow::Result;
use clap::Parser;
use tokio::signal;

use docqa::cli::commands::{
    handle_ask, handle_config, handle_documents, handle_ingest, handle_status,
};
use docqa::cli::{Cli, Commands};
use docqa::error::ConfigError;
use docqa::logging;
use docqa::models::{Config, LoggingConfig, OutputFormat, ResolvedConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let resolved = Config::load(cli.config.as_deref());

    let logging_config = resolved
        .as_ref()
        .map(|r| r.config.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    logging::init(&logging_config, cli.verbose);

    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;

    tokio::select! {
        result = run_command(cli, resolved, format, verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, cleaning up...");
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    Ok(())
}

async fn run_command(
    cli: Cli,
    resolved: Result<ResolvedConfig, ConfigError>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    if let Some(path) = &cli.config {
        tracing::debug!("using config {}", path.display());
    }

    match cli.command {
        // Config commands must work even when the current config is broken.
        Commands::Config(cmd) => handle_config(cmd, cli.config.as_deref(), format, verbose).await,
        Commands::Ingest(args) => handle_ingest(args, resolved?.config, format, verbose).await,
        Commands::Ask(args) => handle_ask(args, resolved?.config, format, verbose).await,
        Commands::Documents(cmd) => {
            handle_documents(cmd, resolved?.config, format, verbose).await
        }
        Commands::Status => handle_status(resolved?.config, format, verbose).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
