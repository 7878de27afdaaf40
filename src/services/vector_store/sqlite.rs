//! SQLite vector backend with in-process cosine ranking.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use super::VectorIndex;
use super::memory::rank;
use crate::error::VectorStoreError;
use crate::models::{ChunkMetadata, EmbeddingRecord, VectorHit};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    document_id INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    vector TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vectors_namespace ON vectors(namespace);
"#;

/// Vectors stored as JSON arrays in one SQLite table.
///
/// Every query scans the namespace, so this fits document-sized
/// collections rather than large corpora.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    pub fn open(path: &Path) -> Result<Self, VectorStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(connection_error)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(connection_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, VectorStoreError> {
        let conn = Connection::open_in_memory().map_err(connection_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, VectorStoreError> {
        self.conn
            .lock()
            .map_err(|_| VectorStoreError::ConnectionError("sqlite index lock poisoned".to_string()))
    }
}

fn connection_error(e: rusqlite::Error) -> VectorStoreError {
    VectorStoreError::ConnectionError(e.to_string())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| true)
            .map_err(connection_error)
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStoreError> {
        let vector = serde_json::to_string(&record.vector)
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO vectors (id, namespace, document_id, chunk_index, vector)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                namespace = excluded.namespace,
                document_id = excluded.document_id,
                chunk_index = excluded.chunk_index,
                vector = excluded.vector",
            params![
                record.vector_id,
                record.namespace,
                record.metadata.document_id,
                record.metadata.chunk_index,
                vector
            ],
        )
        .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let records = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, document_id, chunk_index, vector FROM vectors
                     WHERE namespace = ?1 ORDER BY rowid",
                )
                .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

            let rows = stmt
                .query_map(params![namespace], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let (vector_id, document_id, chunk_index, raw) =
                    row.map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                let stored: Vec<f32> = serde_json::from_str(&raw)
                    .map_err(|e| VectorStoreError::QueryError(format!("corrupt vector {vector_id}: {e}")))?;
                records.push(EmbeddingRecord {
                    vector_id,
                    vector: stored,
                    namespace: namespace.to_string(),
                    metadata: ChunkMetadata {
                        document_id,
                        chunk_index,
                    },
                });
            }
            records
        };

        Ok(rank(records.iter(), vector, k, include_metadata))
    }

    async fn delete(&self, id: &str, namespace: &str) -> Result<(), VectorStoreError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM vectors WHERE id = ?1 AND namespace = ?2",
            params![id, namespace],
        )
        .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorStoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM vectors WHERE namespace = ?1", params![namespace])
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        let conn = self.lock()?;
        let count: Option<i64> = conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
            .optional()
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
        Ok(count.unwrap_or(0) as u64)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
