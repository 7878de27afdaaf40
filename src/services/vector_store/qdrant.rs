//! Qdrant vector index backend.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::HashMap;

use super::VectorIndex;
use crate::error::VectorStoreError;
use crate::models::{ChunkMetadata, EmbeddingRecord, VectorHit, VectorStoreConfig};

const NAMESPACE_FIELD: &str = "namespace";

/// Qdrant backend. All documents share one collection; the namespace is a
/// payload field applied as a `must` filter.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: u64,
}

impl QdrantIndex {
    pub fn new(config: &VectorStoreConfig, dimension: usize) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url)
            .timeout(std::time::Duration::from_secs(config.timeout_secs));

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: dimension as u64,
        })
    }

    fn namespace_filter(namespace: &str) -> Filter {
        Filter::must([Condition::matches(NAMESPACE_FIELD, namespace.to_string())])
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
    }
}

fn integer_field(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(Kind::IntegerValue(n)) => Some(*n),
        _ => None,
    })
}

fn point_id_string(id: Option<&qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id.and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(())
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStoreError> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(NAMESPACE_FIELD.to_string(), record.namespace.into());
        payload.insert(
            "document_id".to_string(),
            record.metadata.document_id.into(),
        );
        payload.insert(
            "chunk_index".to_string(),
            i64::from(record.metadata.chunk_index).into(),
        );

        let point = PointStruct::new(record.vector_id, record.vector, payload);
        let upsert = UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true);

        self.client
            .upsert_points(upsert)
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

        let search = SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
            .filter(Self::namespace_filter(namespace))
            .with_payload(include_metadata);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .map(|point| {
                let metadata = if include_metadata {
                    match (
                        integer_field(&point.payload, "document_id"),
                        integer_field(&point.payload, "chunk_index"),
                    ) {
                        (Some(document_id), Some(chunk_index)) => Some(ChunkMetadata {
                            document_id,
                            chunk_index: chunk_index as u32,
                        }),
                        _ => None,
                    }
                } else {
                    None
                };

                VectorHit {
                    id: point_id_string(point.id.as_ref()),
                    score: point.score,
                    metadata,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn delete(&self, id: &str, namespace: &str) -> Result<(), VectorStoreError> {
        let filter = Filter::must([
            Condition::has_id([id.to_string()]),
            Condition::matches(NAMESPACE_FIELD, namespace.to_string()),
        ]);
        let delete = DeletePointsBuilder::new(&self.collection)
            .points(filter)
            .wait(true);

        self.client
            .delete_points(delete)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorStoreError> {
        let delete = DeletePointsBuilder::new(&self.collection)
            .points(Self::namespace_filter(namespace))
            .wait(true);

        self.client
            .delete_points(delete)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(info.result.map_or(0, |r| r.points_count.unwrap_or(0)))
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
