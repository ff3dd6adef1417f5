//! Result types returned by a completed conversion.

use crate::error::StageWarning;
use crate::placeholder::{Placeholder, PlaceholderMap};
use serde::{Deserialize, Serialize};

/// Overall outcome of a request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Every chunk was rewritten and every image was stored.
    Success,
    /// Markdown was produced, but at least one warning was absorbed on the way.
    Degraded,
    /// The document had neither text nor images; a canned message was returned.
    NoContent,
}

/// One materialized image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// URL, relative path or `data:` URI, embeddable in `![..](reference)` as-is.
    pub reference: String,
    pub mime_type: String,
    /// Alt text. Empty when the document provided none.
    pub description: String,
    /// The token that marked this image's position during rewriting.
    pub placeholder: Placeholder,
}

impl ImageRecord {
    /// Markdown image syntax for this record.
    ///
    /// Brackets in the description are escaped; references containing
    /// whitespace or parentheses are wrapped in `<…>`.
    pub fn markdown(&self) -> String {
        let alt = self.description.replace('[', "\\[").replace(']', "\\]");
        let needs_angle = self
            .reference
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')');
        if needs_angle {
            format!("![{}](<{}>)", alt, self.reference)
        } else {
            format!("![{}]({})", alt, self.reference)
        }
    }
}

/// Counters and timings for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages seen by the extractor (1 for DOCX).
    pub pages: usize,
    /// Elements produced by the extractor, text and image.
    pub elements: usize,
    /// Images discovered during extraction.
    pub images_found: usize,
    /// Images successfully materialized.
    pub images_stored: usize,
    /// Rewrite chunks.
    pub chunks: usize,
    /// Chunks that used the deterministic fallback.
    pub fallback_chunks: usize,
    /// Images re-injected at the end of the document.
    pub images_appended: usize,
    pub extract_duration_ms: u64,
    pub rewrite_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Complete result of one conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub status: ConversionStatus,
    /// Final Markdown document.
    pub markdown: String,
    /// Original file name as received.
    pub filename: String,
    /// Materialized images in discovery order.
    pub images: Vec<ImageRecord>,
    /// Placeholder → image mapping, retained for debugging.
    pub placeholders: PlaceholderMap,
    /// Everything that degraded without failing the request.
    pub warnings: Vec<StageWarning>,
    pub stats: ConversionStats,
}
