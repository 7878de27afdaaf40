//! Raw text extraction from uploaded files.

use std::path::Path;

use crate::error::IngestError;
use crate::utils::{DocumentFormat, MAX_FILE_SIZE, read_text_file};

/// Extract the plain text of a `.txt`, `.md` or `.pdf` file.
///
/// Blocking; run it off the async runtime for large PDFs.
pub fn extract_text(path: &Path) -> Result<String, IngestError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        IngestError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        )
    })?;

    match format {
        DocumentFormat::Text | DocumentFormat::Markdown => Ok(read_text_file(path, MAX_FILE_SIZE)?),
        DocumentFormat::Pdf => extract_pdf(path),
    }
}

fn extract_pdf(path: &Path) -> Result<String, IngestError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(IngestError::ExtractionFailed {
            path: path.display().to_string(),
            reason: format!("file exceeds maximum size: {}", metadata.len()),
        });
    }

    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| IngestError::ExtractionFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
