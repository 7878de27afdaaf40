//! Process-local vector index.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::VectorIndex;
use crate::error::VectorStoreError;
use crate::models::{EmbeddingRecord, VectorHit};
use crate::services::similarity::cosine_similarity;

/// Vectors held in memory, grouped by namespace in insertion order.
///
/// Scoring is exact cosine similarity. Equal scores keep insertion order.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    namespaces: RwLock<HashMap<String, Vec<EmbeddingRecord>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> VectorStoreError {
    VectorStoreError::ConnectionError("memory index lock poisoned".to_string())
}

/// Rank `records` against `vector` and keep the best `k`.
///
/// Shared with the SQLite backend, which also scores in-process.
pub(super) fn rank<'a>(
    records: impl Iterator<Item = &'a EmbeddingRecord>,
    vector: &[f32],
    k: usize,
    include_metadata: bool,
) -> Vec<VectorHit> {
    let mut scored: Vec<(f32, &EmbeddingRecord)> = records
        .filter_map(|record| cosine_similarity(vector, &record.vector).map(|s| (s, record)))
        .collect();

    // sort_by is stable, so ties stay in iteration order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, record)| VectorHit {
            id: record.vector_id.clone(),
            score,
            metadata: include_metadata.then_some(record.metadata),
        })
        .collect()
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorStoreError> {
        let mut namespaces = self.namespaces.write().map_err(|_| poisoned())?;
        let records = namespaces.entry(record.namespace.clone()).or_default();

        match records.iter_mut().find(|r| r.vector_id == record.vector_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
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

        let namespaces = self.namespaces.read().map_err(|_| poisoned())?;
        let Some(records) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        Ok(rank(records.iter(), vector, k, include_metadata))
    }

    async fn delete(&self, id: &str, namespace: &str) -> Result<(), VectorStoreError> {
        let mut namespaces = self.namespaces.write().map_err(|_| poisoned())?;
        if let Some(records) = namespaces.get_mut(namespace) {
            records.retain(|r| r.vector_id != id);
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), VectorStoreError> {
        let mut namespaces = self.namespaces.write().map_err(|_| poisoned())?;
        namespaces.remove(namespace);
        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        let namespaces = self.namespaces.read().map_err(|_| poisoned())?;
        Ok(namespaces.values().map(|r| r.len() as u64).sum())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
