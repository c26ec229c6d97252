//! Per-page text extraction from PDF files.
//!
//! This module is only available when the `pdf` feature is enabled. Pages
//! come back in document order, so feeding them to
//! [`Chunker::chunk_pages`](crate::Chunker::chunk_pages) records real page
//! numbers on every chunk.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{RagError, Result};

/// Extract the text of every page of the PDF at `path`.
///
/// Parsing runs on the blocking thread pool. A parser panic on a malformed
/// file is reported as an error.
///
/// # Errors
///
/// Returns [`RagError::DocumentError`] if the file cannot be read or is not
/// a PDF the parser understands.
pub async fn extract_pdf_pages(path: impl Into<PathBuf>) -> Result<Vec<String>> {
    let path = path.into();
    let name = source_name(&path);

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| document_error(&name, format!("could not read file: {e}")))?;

    let task_name = name.clone();
    let pages = tokio::task::spawn_blocking(move || extract_pdf_pages_from_bytes(&task_name, &bytes))
        .await
        .map_err(|e| {
            error!(document = %name, error = %e, "PDF parser aborted");
            document_error(&name, format!("parser aborted: {e}"))
        })??;

    debug!(document = %name, pages = pages.len(), "PDF text extracted");
    Ok(pages)
}

/// Extract page texts from an in-memory PDF. `name` labels errors.
///
/// # Errors
///
/// Returns [`RagError::DocumentError`] if the bytes are not a readable PDF.
pub fn extract_pdf_pages_from_bytes(name: &str, bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| document_error(name, format!("text extraction failed: {e}")))
}

fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn document_error(name: &str, message: String) -> RagError {
    RagError::DocumentError { source_name: name.to_string(), message }
}
