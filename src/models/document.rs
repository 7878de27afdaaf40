use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a document by the catalog at registration.
pub type DocumentId = i64;

/// Ingestion status of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Indexed,
    Failed,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Uploaded => write!(f, "uploaded"),
            DocumentStatus::Indexed => write!(f, "indexed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "indexed" => Ok(DocumentStatus::Indexed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// A registered document. Owned by the catalog, read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    /// Where the original file lives (path or URI).
    pub locator: String,
    /// SHA-256 of the extracted text.
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
}

impl Document {
    /// Namespace used for this document's vectors.
    pub fn namespace(&self) -> String {
        namespace_for(self.id)
    }
}

/// Vector-index namespace for a document id.
pub fn namespace_for(document_id: DocumentId) -> String {
    document_id.to_string()
}

/// A window of document text paired with its embedding id.
///
/// `chunk_index` is the position in the source document; it says nothing
/// about retrieval rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub text: String,
    pub vector_id: String,
}

impl Chunk {
    pub fn generate_vector_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Metadata stored next to every vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: DocumentId,
    pub chunk_index: u32,
}

/// What the vector index stores for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub vector_id: String,
    pub vector: Vec<f32>,
    pub namespace: String,
    pub metadata: ChunkMetadata,
}

impl EmbeddingRecord {
    pub fn for_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            vector_id: chunk.vector_id.clone(),
            vector,
            namespace: namespace_for(chunk.document_id),
            metadata: ChunkMetadata {
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
            },
        }
    }
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunks_created: u32,
    pub chunks_skipped: u32,
}

impl IngestReport {
    pub fn total_chunks(&self) -> u32 {
        self.chunks_created + self.chunks_skipped
    }
}
