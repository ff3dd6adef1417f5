//! Format dispatch for extraction.
//!
//! Both extractors are synchronous. pdfium is not async-safe and DOCX parsing
//! is CPU-bound, so either runs on the blocking pool via `spawn_blocking`,
//! keeping the Tokio worker threads free.

pub mod docx;
pub mod pdf;

use crate::element::{DocumentFormat, ExtractedDocument};
use crate::error::Doc2MdError;

/// Extract positioned elements from `bytes`, already validated as `format`.
pub async fn extract(
    format: DocumentFormat,
    filename: &str,
    bytes: &[u8],
) -> Result<ExtractedDocument, Doc2MdError> {
    let filename = filename.to_string();
    let bytes = bytes.to_vec();

    tokio::task::spawn_blocking(move || match format {
        DocumentFormat::Pdf => pdf::extract_pdf(&filename, &bytes),
        DocumentFormat::Docx => docx::extract_docx(&filename, &bytes),
    })
    .await
    .map_err(|e| Doc2MdError::Internal(format!("Extraction task panicked: {}", e)))?
}
