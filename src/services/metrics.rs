use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

/// In-process counters for the answer and ingestion pipelines.
///
/// Failures inside `ask` degrade silently to empty context or a fallback
/// answer; these counters are where they become visible.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    asks: AtomicU64,
    retrievals: AtomicU64,
    embed_failures: AtomicU64,
    backend_failures: AtomicU64,
    dropped_hits: AtomicU64,
    generation_failures: AtomicU64,
    chunks_created: AtomicU64,
    chunks_skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub asks: u64,
    pub retrievals: u64,
    pub embed_failures: u64,
    pub backend_failures: u64,
    pub dropped_hits: u64,
    pub generation_failures: u64,
    pub chunks_created: u64,
    pub chunks_skipped: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ask(&self) {
        self.asks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retrieval(&self) {
        self.retrievals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_embed_failure(&self) {
        self.embed_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_hits(&self, n: u64) {
        self.dropped_hits.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest(&self, created: u64, skipped: u64) {
        self.chunks_created.fetch_add(created, Ordering::Relaxed);
        self.chunks_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            asks: self.asks.load(Ordering::Relaxed),
            retrievals: self.retrievals.load(Ordering::Relaxed),
            embed_failures: self.embed_failures.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            dropped_hits: self.dropped_hits.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            chunks_created: self.chunks_created.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
        }
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ask_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    retrieved INTEGER NOT NULL,
    dropped INTEGER NOT NULL,
    success INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ask_log_timestamp ON ask_log(timestamp);
"#;

/// One row per answered question.
#[derive(Debug, Clone, Copy, Default)]
pub struct AskRecord {
    pub latency_ms: u64,
    /// Chunks placed in the context.
    pub retrieved: u64,
    /// Hits the chunk store could not resolve.
    pub dropped: u64,
    /// False when any stage degraded.
    pub success: bool,
}

/// Persistent ask log used by `docqa status`.
pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn record(&self, record: AskRecord) {
        if let Err(e) = self.conn.execute(
            "INSERT INTO ask_log (timestamp, latency_ms, retrieved, dropped, success)
             VALUES (datetime('now'), ?1, ?2, ?3, ?4)",
            params![
                record.latency_ms as i64,
                record.retrieved as i64,
                record.dropped as i64,
                record.success as i32
            ],
        ) {
            tracing::debug!("failed to record ask metrics: {e}");
        }
    }

    pub fn get_summary(&self, retention_days: u32) -> MetricsSummary {
        let query = format!(
            r#"
            SELECT
                COUNT(*) as total_asks,
                COALESCE(AVG(latency_ms), 0) as avg_latency_ms,
                COALESCE(AVG(retrieved), 0) as avg_retrieved,
                COALESCE(SUM(dropped), 0) as dropped_hits,
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END) * 100.0 / NULLIF(COUNT(*), 0), 0) as degraded_rate
            FROM ask_log
            WHERE timestamp >= datetime('now', '-{} days')
            "#,
            retention_days
        );

        self.conn
            .query_row(&query, [], |row| {
                Ok(MetricsSummary {
                    total_asks: row.get::<_, i64>(0)? as u64,
                    avg_latency_ms: row.get::<_, f64>(1)? as u64,
                    avg_retrieved: row.get::<_, f64>(2)? as f32,
                    dropped_hits: row.get::<_, i64>(3)? as u64,
                    degraded_rate: row.get::<_, f64>(4)? as f32,
                })
            })
            .unwrap_or_default()
    }

    pub fn cleanup(&self, retention_days: u32) {
        let query = format!(
            "DELETE FROM ask_log WHERE timestamp < datetime('now', '-{} days')",
            retention_days
        );
        if let Err(e) = self.conn.execute(&query, []) {
            tracing::debug!("failed to clean up ask metrics: {e}");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_asks: u64,
    pub avg_latency_ms: u64,
    pub avg_retrieved: f32,
    pub dropped_hits: u64,
    /// Percentage of asks where some stage degraded.
    pub degraded_rate: f32,
}
