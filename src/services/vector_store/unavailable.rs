//! Placeholder for a backend that could not be reached at startup.

use async_trait::async_trait;

use super::VectorIndex;
use crate::error::VectorStoreError;
use crate::models::{EmbeddingRecord, VectorHit};

/// Fails every operation with the error seen while connecting.
///
/// Installed in place of a real backend so questions can still be answered
/// without context.
#[derive(Debug, Clone)]
pub struct UnavailableIndex {
    name: String,
    reason: String,
}

impl UnavailableIndex {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    fn error(&self) -> VectorStoreError {
        VectorStoreError::ConnectionError(self.reason.clone())
    }
}

#[async_trait]
impl VectorIndex for UnavailableIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(false)
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        Err(self.error())
    }

    async fn upsert(&self, _record: EmbeddingRecord) -> Result<(), VectorStoreError> {
        Err(self.error())
    }

    async fn query(
        &self,
        _vector: &[f32],
        _k: usize,
        _namespace: &str,
        _include_metadata: bool,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        Err(self.error())
    }

    async fn delete(&self, _id: &str, _namespace: &str) -> Result<(), VectorStoreError> {
        Err(self.error())
    }

    async fn delete_namespace(&self, _namespace: &str) -> Result<(), VectorStoreError> {
        Err(self.error())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        Err(self.error())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
