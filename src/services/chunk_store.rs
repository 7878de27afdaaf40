//! Relational chunk store and document catalog.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::models::{Chunk, Document, DocumentId, DocumentStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    locator TEXT NOT NULL,
    checksum TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    vector_id TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_documents_uploaded_at ON documents(uploaded_at);
CREATE INDEX IF NOT EXISTS idx_document_chunks_document ON document_chunks(document_id, chunk_index);
"#;

/// Maps vector ids back to chunk text.
pub trait ChunkStore: Send + Sync {
    /// Persist a chunk. Fails if its vector id is already taken or its
    /// document does not exist.
    fn insert_chunk(&self, chunk: &Chunk) -> Result<(), StoreError>;

    /// The chunk paired with `vector_id`, if one was committed.
    fn find_by_vector_id(&self, vector_id: &str) -> Result<Option<Chunk>, StoreError>;

    /// All chunks of a document in `chunk_index` order.
    fn chunks_for_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>, StoreError>;

    fn count_chunks(&self) -> Result<u64, StoreError>;
}

/// Registry of uploaded documents.
pub trait DocumentCatalog: Send + Sync {
    /// Register a new document with status `Uploaded`.
    fn register(&self, filename: &str, locator: &str, checksum: &str)
    -> Result<Document, StoreError>;

    /// Most recently uploaded document; the highest id wins a timestamp tie.
    fn latest(&self) -> Result<Option<Document>, StoreError>;

    fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// All documents, newest first.
    fn list(&self) -> Result<Vec<Document>, StoreError>;

    fn set_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), StoreError>;

    /// Delete a document and, by cascade, its chunks.
    fn delete(&self, id: DocumentId) -> Result<(), StoreError>;

    fn count_documents(&self) -> Result<u64, StoreError>;
}

/// SQLite implementation of both [`ChunkStore`] and [`DocumentCatalog`].
///
/// One connection behind a mutex; statements are short so readers and the
/// ingestion writer simply take turns.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

const DOCUMENT_COLUMNS: &str = "id, filename, locator, checksum, uploaded_at, status";

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // fixed width so lexical order matches time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let uploaded_at: String = row.get(4)?;
    let status: String = row.get(5)?;

    let uploaded_at = DateTime::parse_from_rfc3339(&uploaded_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let status = status.parse::<DocumentStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(Document {
        id: row.get(0)?,
        filename: row.get(1)?,
        locator: row.get(2)?,
        checksum: row.get(3)?,
        uploaded_at,
        status,
    })
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        document_id: row.get(0)?,
        chunk_index: row.get(1)?,
        text: row.get(2)?,
        vector_id: row.get(3)?,
    })
}

impl ChunkStore for SqliteStore {
    fn insert_chunk(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO document_chunks (document_id, chunk_index, text, vector_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                chunk.document_id,
                chunk.chunk_index,
                chunk.text,
                chunk.vector_id
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StoreError::DuplicateVectorId(chunk.vector_id.clone()))
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Err(StoreError::DocumentNotFound(chunk.document_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_vector_id(&self, vector_id: &str) -> Result<Option<Chunk>, StoreError> {
        let conn = self.lock()?;
        let chunk = conn
            .query_row(
                "SELECT document_id, chunk_index, text, vector_id
                 FROM document_chunks WHERE vector_id = ?1",
                params![vector_id],
                chunk_from_row,
            )
            .optional()?;
        Ok(chunk)
    }

    fn chunks_for_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT document_id, chunk_index, text, vector_id
             FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index",
        )?;
        let chunks = stmt
            .query_map(params![document_id], chunk_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    fn count_chunks(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM document_chunks", [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }
}

impl DocumentCatalog for SqliteStore {
    fn register(
        &self,
        filename: &str,
        locator: &str,
        checksum: &str,
    ) -> Result<Document, StoreError> {
        let uploaded_at = Utc::now();
        let status = DocumentStatus::Uploaded;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (filename, locator, checksum, uploaded_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                filename,
                locator,
                checksum,
                format_timestamp(&uploaded_at),
                status.to_string()
            ],
        )?;

        Ok(Document {
            id: conn.last_insert_rowid(),
            filename: filename.to_string(),
            locator: locator.to_string(),
            checksum: checksum.to_string(),
            uploaded_at,
            status,
        })
    }

    fn latest(&self) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        let query = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY uploaded_at DESC, id DESC LIMIT 1"
        );
        let document = conn.query_row(&query, [], document_from_row).optional()?;
        Ok(document)
    }

    fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
        let document = conn
            .query_row(&query, params![id], document_from_row)
            .optional()?;
        Ok(document)
    }

    fn list(&self) -> Result<Vec<Document>, StoreError> {
        let conn = self.lock()?;
        let query =
            format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY uploaded_at DESC, id DESC");
        let mut stmt = conn.prepare(&query)?;
        let documents = stmt
            .query_map([], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    fn set_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::DocumentNotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: DocumentId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::DocumentNotFound(id));
        }
        Ok(())
    }

    fn count_documents(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
