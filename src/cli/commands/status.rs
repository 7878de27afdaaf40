use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::{
    ChunkStore, DocumentCatalog, HttpEmbedder, MetricsStore, SqliteStore, create_backend,
};

pub async fn handle_status(config: Config, format: OutputFormat, verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    let embedder = HttpEmbedder::new(&config.embedding)?;
    let (embedding_healthy, embedding_model) = match embedder.health_check().await {
        Ok(health) => (true, health.model_id),
        Err(e) => {
            if verbose {
                eprintln!("Embedding server: {e}");
            }
            (false, None)
        }
    };

    let dimension = config.embedding.dimension as usize;
    let (vector_store_connected, vector_count) =
        match create_backend(&config.vector_store, dimension).await {
            Ok(index) => {
                let connected = index.health_check().await.unwrap_or(false);
                let count = if connected {
                    index.count().await.unwrap_or(0)
                } else {
                    0
                };
                (connected, count)
            }
            Err(e) => {
                if verbose {
                    eprintln!("Vector store: {e}");
                }
                (false, 0)
            }
        };

    let (document_count, chunk_count, latest_document) =
        match SqliteStore::open(&config.store.resolved_path()) {
            Ok(store) => (
                store.count_documents().unwrap_or(0),
                store.count_chunks().unwrap_or(0),
                store.latest().ok().flatten(),
            ),
            Err(e) => {
                if verbose {
                    eprintln!("Chunk store: {e}");
                }
                (0, 0, None)
            }
        };

    let metrics = if config.metrics.enabled {
        MetricsStore::open(&config.metrics.resolved_path())
            .ok()
            .map(|store| store.get_summary(config.metrics.retention_days))
    } else {
        None
    };

    let status = StatusInfo {
        embedding_url: embedder.base_url().to_string(),
        embedding_healthy,
        embedding_model,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_connected,
        vector_count,
        document_count,
        chunk_count,
        latest_document,
        metrics,
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_healthy || !vector_store_connected {
        eprintln!();
        if !embedding_healthy {
            eprintln!(
                "Warning: embedding server not reachable at {}. Questions will fall back to the no-context answer.",
                config.embedding.url
            );
        }
        if !vector_store_connected {
            match config.vector_store.driver {
                VectorDriver::Qdrant => {
                    eprintln!(
                        "Warning: Qdrant not reachable at {}. Check that it is running.",
                        config.vector_store.url
                    );
                }
                VectorDriver::PostgreSQL => {
                    eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
                }
                VectorDriver::Sqlite => {
                    eprintln!(
                        "Warning: vector database at {} could not be opened.",
                        config.vector_store.sqlite_path().display()
                    );
                }
                VectorDriver::Memory => {}
            }
        }
    }

    Ok(())
}
