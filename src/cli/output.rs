use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{AskResponse, Chunk, Document, OutputFormat};
use crate::services::{MetricsSnapshot, MetricsSummary};

pub trait Formatter {
    fn format_answer(&self, response: &AskResponse) -> String;
    fn format_ingest(&self, summary: &IngestSummary) -> String;
    fn format_documents(&self, documents: &[Document]) -> String;
    fn format_document(&self, document: &Document, chunks: &[Chunk]) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_url: String,
    pub embedding_healthy: bool,
    pub embedding_model: Option<String>,
    pub vector_store_driver: String,
    pub vector_store_connected: bool,
    pub vector_count: u64,
    pub document_count: u64,
    pub chunk_count: u64,
    pub latest_document: Option<Document>,
    pub metrics: Option<MetricsSummary>,
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFileResult {
    pub path: String,
    pub document_id: Option<i64>,
    pub chunks_created: u32,
    pub chunks_skipped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub files: Vec<IngestFileResult>,
    pub duration_ms: u64,
    pub counters: MetricsSnapshot,
}

impl IngestSummary {
    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        format!("{}...", head)
    } else {
        head
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_answer(&self, response: &AskResponse) -> String {
        let mut output = String::new();
        writeln!(output, "Q: {}", response.question).unwrap();
        writeln!(output, "A: {}", response.answer).unwrap();

        if !response.context.is_empty() {
            writeln!(output, "\nContext ({} passages)", response.context.len()).unwrap();
            writeln!(output, "---").unwrap();
            for (i, passage) in response.context.iter().enumerate() {
                writeln!(output, "{}. {}", i + 1, preview(passage, 200).replace('\n', " ")).unwrap();
            }
        }
        output
    }

    fn format_ingest(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Ingestion Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        for file in &summary.files {
            match (&file.error, file.document_id) {
                (Some(error), _) => writeln!(output, "✗ {}: {}", file.path, error).unwrap(),
                (None, Some(id)) => writeln!(
                    output,
                    "✓ {} -> document {} ({} chunks, {} skipped)",
                    file.path, id, file.chunks_created, file.chunks_skipped
                )
                .unwrap(),
                (None, None) => writeln!(output, "? {}", file.path).unwrap(),
            }
        }
        writeln!(output).unwrap();
        writeln!(output, "Files: {} ({} failed)", summary.files.len(), summary.failed()).unwrap();
        writeln!(output, "Chunks created: {}", summary.counters.chunks_created).unwrap();
        writeln!(output, "Chunks skipped: {}", summary.counters.chunks_skipped).unwrap();
        writeln!(output, "Duration: {}ms", summary.duration_ms).unwrap();
        output
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        if documents.is_empty() {
            return "No documents ingested.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Documents").unwrap();
        writeln!(output, "---------").unwrap();
        for doc in documents {
            writeln!(
                output,
                "{:>5}  {:<9} {}  {}",
                doc.id,
                doc.status,
                doc.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                doc.filename
            )
            .unwrap();
        }
        output
    }

    fn format_document(&self, document: &Document, chunks: &[Chunk]) -> String {
        let mut output = String::new();
        writeln!(output, "Document {}", document.id).unwrap();
        writeln!(output, "  File:      {}", document.filename).unwrap();
        writeln!(output, "  Location:  {}", document.locator).unwrap();
        writeln!(output, "  Status:    {}", document.status).unwrap();
        writeln!(output, "  Uploaded:  {}", document.uploaded_at.to_rfc3339()).unwrap();
        writeln!(output, "  Checksum:  {}", document.checksum).unwrap();
        writeln!(output, "  Chunks:    {}", chunks.len()).unwrap();
        for chunk in chunks {
            writeln!(output, "\n[{}] {}", chunk.chunk_index, chunk.vector_id).unwrap();
            for line in preview(&chunk.text, 200).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedding_status = if status.embedding_healthy {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Embedding:     {} {}", status.embedding_url, embedding_status).unwrap();
        if let Some(ref model) = status.embedding_model {
            writeln!(output, "  Model:       {}", model).unwrap();
        }
        writeln!(output).unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} {}",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        if status.vector_store_connected {
            writeln!(output, "  Vectors:     {}", status.vector_count).unwrap();
        }
        writeln!(output).unwrap();

        writeln!(output, "Documents:     {}", status.document_count).unwrap();
        writeln!(output, "Chunks:        {}", status.chunk_count).unwrap();
        if let Some(ref doc) = status.latest_document {
            writeln!(output, "Latest:        {} ({})", doc.filename, doc.id).unwrap();
        }

        if let Some(ref m) = status.metrics {
            writeln!(output).unwrap();
            writeln!(output, "Questions:     {}", m.total_asks).unwrap();
            writeln!(output, "  Avg Latency: {}ms", m.avg_latency_ms).unwrap();
            writeln!(output, "  Avg Context: {:.1}", m.avg_retrieved).unwrap();
            if m.dropped_hits > 0 {
                writeln!(output, "  Dropped:     {}", m.dropped_hits).unwrap();
            }
            if m.degraded_rate > 0.0 {
                writeln!(output, "  Degraded:    {:.1}%", m.degraded_rate).unwrap();
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_answer(&self, response: &AskResponse) -> String {
        self.render(response)
    }

    fn format_ingest(&self, summary: &IngestSummary) -> String {
        self.render(summary)
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        self.render(&serde_json::json!({ "documents": documents }))
    }

    fn format_document(&self, document: &Document, chunks: &[Chunk]) -> String {
        self.render(&serde_json::json!({
            "document": document,
            "chunks": chunks,
        }))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_answer(&self, response: &AskResponse) -> String {
        let mut output = String::new();
        writeln!(output, "## Answer\n").unwrap();
        writeln!(output, "**Question:** {}\n", response.question).unwrap();
        writeln!(output, "{}\n", response.answer).unwrap();

        if !response.context.is_empty() {
            writeln!(output, "### Context\n").unwrap();
            for (i, passage) in response.context.iter().enumerate() {
                writeln!(output, "**{}.**\n", i + 1).unwrap();
                writeln!(output, "```").unwrap();
                writeln!(output, "{}", passage).unwrap();
                writeln!(output, "```\n").unwrap();
            }
        }
        output
    }

    fn format_ingest(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        writeln!(output, "## Ingestion Complete\n").unwrap();
        writeln!(output, "| File | Document | Chunks | Skipped | Error |").unwrap();
        writeln!(output, "|------|----------|--------|---------|-------|").unwrap();
        for file in &summary.files {
            writeln!(
                output,
                "| `{}` | {} | {} | {} | {} |",
                file.path,
                file.document_id.map(|id| id.to_string()).unwrap_or_default(),
                file.chunks_created,
                file.chunks_skipped,
                file.error.as_deref().unwrap_or("")
            )
            .unwrap();
        }
        writeln!(output, "\nDuration: {}ms", summary.duration_ms).unwrap();
        output
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        if documents.is_empty() {
            return "## Documents\n\n*No documents ingested.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Documents\n").unwrap();
        writeln!(output, "| ID | File | Status | Uploaded |").unwrap();
        writeln!(output, "|----|------|--------|----------|").unwrap();
        for doc in documents {
            writeln!(
                output,
                "| {} | `{}` | {} | {} |",
                doc.id,
                doc.filename,
                doc.status,
                doc.uploaded_at.format("%Y-%m-%d %H:%M:%S")
            )
            .unwrap();
        }
        output
    }

    fn format_document(&self, document: &Document, chunks: &[Chunk]) -> String {
        let mut output = String::new();
        writeln!(output, "## {} (document {})\n", document.filename, document.id).unwrap();
        writeln!(output, "- **Location:** `{}`", document.locator).unwrap();
        writeln!(output, "- **Status:** {}", document.status).unwrap();
        writeln!(output, "- **Uploaded:** {}", document.uploaded_at.to_rfc3339()).unwrap();
        writeln!(output, "- **Chunks:** {}\n", chunks.len()).unwrap();
        for chunk in chunks {
            writeln!(output, "### Chunk {}\n", chunk.chunk_index).unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", chunk.text).unwrap();
            writeln!(output, "```\n").unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let embedding_status = if status.embedding_healthy { "✅" } else { "❌" };
        writeln!(output, "### Embedding {}\n", embedding_status).unwrap();
        writeln!(output, "- **URL:** `{}`", status.embedding_url).unwrap();
        if let Some(ref model) = status.embedding_model {
            writeln!(output, "- **Model:** {}", model).unwrap();
        }
        writeln!(output).unwrap();

        let vector_status = if status.vector_store_connected {
            "✅"
        } else {
            "❌"
        };
        writeln!(
            output,
            "### Vector Store ({}) {}\n",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "- **Vectors:** {}", status.vector_count).unwrap();
        writeln!(output, "- **Documents:** {}", status.document_count).unwrap();
        writeln!(output, "- **Chunks:** {}", status.chunk_count).unwrap();

        if let Some(ref m) = status.metrics {
            writeln!(output, "\n### Questions\n").unwrap();
            writeln!(output, "- **Asked:** {}", m.total_asks).unwrap();
            writeln!(output, "- **Avg Latency:** {}ms", m.avg_latency_ms).unwrap();
            if m.degraded_rate > 0.0 {
                writeln!(output, "- **Degraded:** {:.1}%", m.degraded_rate).unwrap();
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
