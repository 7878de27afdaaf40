use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

use super::VectorIndex;
use crate::error::VectorStoreError;
use crate::models::{ChunkMetadata, EmbeddingRecord, VectorHit, VectorStoreConfig};

pub struct PgVectorIndex {
    pool: PgPool,
    table_name: String,
    dimension: usize,
}

impl PgVectorIndex {
    pub async fn new(config: &VectorStoreConfig, dimension: usize) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let index = Self {
            pool,
            table_name: config.collection.clone(),
            dimension,
        };

        index.check_pgvector_extension().await?;

        Ok(index)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    fn parse_id(id: &str) -> Result<uuid::Uuid, VectorStoreError> {
        uuid::Uuid::parse_str(id)
            .map_err(|e| VectorStoreError::UpsertError(format!("invalid UUID {id}: {e}")))
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                namespace TEXT NOT NULL,
                document_id BIGINT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding vector({}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            self.table_name, self.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_embedding_idx ON {0} USING hnsw (embedding vector_cosine_ops)",
                self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_namespace_idx ON {0} (namespace)",
                self.table_name
            ),
        ];

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        }

        Ok(())
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStoreError> {
        let query = format!(
            r#"
            INSERT INTO {} (id, namespace, document_id, chunk_index, embedding)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                namespace = EXCLUDED.namespace,
                document_id = EXCLUDED.document_id,
                chunk_index = EXCLUDED.chunk_index,
                embedding = EXCLUDED.embedding
            "#,
            self.table_name
        );

        let id = Self::parse_id(&record.vector_id)?;
        let embedding = Vector::from(record.vector);

        sqlx::query(&query)
            .bind(id)
            .bind(record.namespace)
            .bind(record.metadata.document_id)
            .bind(record.metadata.chunk_index as i32)
            .bind(embedding)
            .execute(&self.pool)
            .await
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

        let embedding = Vector::from(vector.to_vec());

        // zero-norm rows score NaN under <=>; keep them out of the result
        let query = format!(
            r#"
            SELECT
                id::text as vector_id,
                1 - (embedding <=> $1) as score,
                document_id,
                chunk_index
            FROM {}
            WHERE namespace = $2
              AND NOT ((embedding <=> $1) = 'NaN'::float8)
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
            self.table_name
        );

        let rows = sqlx::query(&query)
            .bind(embedding)
            .bind(namespace.to_string())
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        let hits = rows
            .into_iter()
            .map(|row: PgRow| {
                let score: f64 = row.get("score");
                let metadata = include_metadata.then(|| ChunkMetadata {
                    document_id: row.get("document_id"),
                    chunk_index: row.get::<i32, _>("chunk_index") as u32,
                });
                VectorHit {
                    id: row.get("vector_id"),
                    score: score as f32,
                    metadata,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn delete(&self, id: &str, namespace: &str) -> Result<(), VectorStoreError> {
        let query = format!(
            "DELETE FROM {} WHERE id = $1 AND namespace = $2",
            self.table_name
        );
        let id = uuid::Uuid::parse_str(id).map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        sqlx::query(&query)
            .bind(id)
            .bind(namespace.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorStoreError> {
        let query = format!("DELETE FROM {} WHERE namespace = $1", self.table_name);

        sqlx::query(&query)
            .bind(namespace.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(row.0 as u64)
    }

    fn name(&self) -> &str {
        "postgresql"
    }
}
