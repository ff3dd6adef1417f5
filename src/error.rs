//! Error types for the edgequake-doc2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Doc2MdError`] (**fatal**): the request cannot produce any Markdown
//!   (unsupported file type, empty upload, the whole document failed to
//!   parse). Returned as `Err(Doc2MdError)` from the `convert*` functions.
//!
//! * [`StageWarning`] (**absorbed**): one image could not be extracted or
//!   stored, or one chunk fell back to deterministic formatting. Stored in
//!   [`crate::output::ConversionOutput::warnings`] so callers can see what
//!   degraded without losing the rest of the document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The file name does not end in `.pdf` or `.docx`.
    #[error("Unsupported file type for '{filename}'. Only PDF and DOCX are accepted.")]
    UnsupportedFormat { filename: String },

    /// The upload carried no bytes (or no file name).
    #[error("Empty input '{filename}': nothing to convert")]
    EmptyInput { filename: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The document as a whole could not be opened or parsed.
    #[error("Extraction failed for '{filename}': {detail}")]
    ExtractionFailed { filename: String, detail: String },

    // ── Rewriter errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2MdError {
    /// Whether the error is the caller's fault (4xx-class in an HTTP front end).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Doc2MdError::UnsupportedFormat { .. }
                | Doc2MdError::EmptyInput { .. }
                | Doc2MdError::InvalidInput { .. }
        )
    }
}

/// A non-fatal condition absorbed by the pipeline.
///
/// Every variant degrades the output gracefully; none aborts the request.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum StageWarning {
    /// One image (or other element) on a page could not be extracted.
    #[error("Page {page}: element skipped during extraction: {detail}")]
    PartialExtraction { page: usize, detail: String },

    /// The image store rejected one image; it is dropped from the output.
    #[error("Image '{name}' could not be stored: {detail}")]
    StorageFailed { name: String, detail: String },

    /// The rewriter errored on a chunk; the chunk was formatted by the fallback.
    #[error("Chunk {chunk}: rewrite failed after {attempts} attempt(s): {detail}")]
    RewriteFailed {
        chunk: usize,
        attempts: u32,
        detail: String,
    },

    /// The rewriter timed out on a chunk; the chunk was formatted by the fallback.
    #[error("Chunk {chunk}: rewrite timed out after {secs}s")]
    RewriteTimeout { chunk: usize, secs: u64 },

    /// The rewrite dropped too many words; the chunk was formatted by the fallback.
    #[error("Chunk {chunk}: content loss detected ({output_words}/{input_words} words kept)")]
    ContentLossDetected {
        chunk: usize,
        input_words: usize,
        output_words: usize,
    },

    /// An image reference was missing from the decoded Markdown and was appended.
    #[error("Image {placeholder} was missing after decoding and was appended at the end")]
    PlaceholderRecovered { placeholder: String },
}
