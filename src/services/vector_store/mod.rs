//! Vector index abstraction layer.
//!
//! Every backend stores one vector per chunk under the namespace of the
//! document it came from, and answers nearest-neighbour queries restricted
//! to a single namespace. Backends are picked from configuration.

mod memory;
mod pgvector;
mod qdrant;
mod sqlite;
mod unavailable;

pub use memory::MemoryIndex;
pub use pgvector::PgVectorIndex;
pub use qdrant::QdrantIndex;
pub use sqlite::SqliteIndex;
pub use unavailable::UnavailableIndex;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::VectorStoreError;
use crate::models::{EmbeddingRecord, VectorDriver, VectorHit, VectorStoreConfig};

/// Abstract trait for vector index operations.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Create the collection or table if it doesn't exist.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Insert or replace one vector.
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStoreError>;

    /// Return up to `k` hits from `namespace`, best first.
    ///
    /// Vectors that cannot be scored (zero norm) are never returned.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<VectorHit>, VectorStoreError>;

    /// Delete one vector. Deleting a missing id is not an error.
    async fn delete(&self, id: &str, namespace: &str) -> Result<(), VectorStoreError>;

    /// Delete every vector in `namespace`.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorStoreError>;

    /// Total number of stored vectors across namespaces.
    async fn count(&self) -> Result<u64, VectorStoreError>;

    /// Backend name for status output.
    fn name(&self) -> &str;
}

/// Create a vector index backend from configuration.
///
/// The returned backend already has its collection or table in place.
pub async fn create_backend(
    config: &VectorStoreConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorIndex>, VectorStoreError> {
    let backend: Arc<dyn VectorIndex> = match config.driver {
        VectorDriver::Memory => Arc::new(MemoryIndex::new()),
        VectorDriver::Sqlite => Arc::new(SqliteIndex::open(&config.sqlite_path())?),
        VectorDriver::Qdrant => Arc::new(QdrantIndex::new(config, dimension)?),
        VectorDriver::PostgreSQL => Arc::new(PgVectorIndex::new(config, dimension).await?),
    };

    backend.ensure_collection().await?;
    tracing::debug!("vector index ready: {}", backend.name());
    Ok(backend)
}
