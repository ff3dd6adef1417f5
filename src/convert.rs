//! Conversion orchestrator: one request through every stage, in order.
//!
//! ```text
//! Received → Extracting → Linearizing → Encoding → Rewriting → Decoding → Verifying → Completed
//!     └──────────┴──────────────────────────── Failed (unrecoverable error) ──────────┘
//! ```
//!
//! Only three things fail a request: an unsupported file name, an empty body,
//! and a document that cannot be opened at all. Everything else (a broken
//! image, a full disk, a rewriter that is down or drops half the text) is
//! absorbed as a [`StageWarning`] and the caller still gets Markdown.
//!
//! A document with neither text nor images skips the rewriter and completes
//! with [`NO_CONTENT_MARKDOWN`].
//!
//! ## Collaborators
//!
//! [`Converter`] owns its [`ImageStore`] and [`TextRewriter`]; nothing is
//! global. A single `Converter` can serve concurrent requests: the only
//! shared state is the store, which writes uniquely named files.

use crate::config::{ConversionConfig, ImageOutput};
use crate::element::ExtractedDocument;
use crate::error::{Doc2MdError, StageWarning};
use crate::output::{ConversionOutput, ConversionStats, ConversionStatus};
use crate::pipeline::llm::{LlmRewriter, PassthroughRewriter, TextRewriter};
use crate::pipeline::{chunk, extract, input, linearize, postprocess, rewrite};
use crate::placeholder::{self, PlaceholderMap};
use crate::storage::{DirectoryImageStore, ImageStore, InlineImageStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Markdown returned for a document with no extractable content.
pub const NO_CONTENT_MARKDOWN: &str = "*No extractable content was found in this document.*\n";

/// Request state, reported through
/// [`crate::progress::ConversionProgressCallback::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStage {
    Received,
    Extracting,
    Linearizing,
    Encoding,
    Rewriting,
    Decoding,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversionStage::Received => "received",
            ConversionStage::Extracting => "extracting",
            ConversionStage::Linearizing => "linearizing",
            ConversionStage::Encoding => "encoding",
            ConversionStage::Rewriting => "rewriting",
            ConversionStage::Decoding => "decoding",
            ConversionStage::Verifying => "verifying",
            ConversionStage::Completed => "completed",
            ConversionStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Reachability of the two collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub storage_reachable: bool,
    pub rewriter_reachable: bool,
    /// Error messages from failed checks.
    pub details: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.storage_reachable && self.rewriter_reachable
    }
}

/// Tracks the current stage and forwards transitions to the progress callback.
struct StageTracker<'a> {
    filename: &'a str,
    config: &'a ConversionConfig,
    current: ConversionStage,
}

impl<'a> StageTracker<'a> {
    fn new(filename: &'a str, config: &'a ConversionConfig) -> Self {
        let tracker = Self {
            filename,
            config,
            current: ConversionStage::Received,
        };
        tracker.notify();
        tracker
    }

    fn enter(&mut self, stage: ConversionStage) {
        debug!("'{}': {} → {}", self.filename, self.current, stage);
        self.current = stage;
        self.notify();
    }

    fn notify(&self) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(self.filename, self.current);
        }
    }
}

/// Converts PDF and DOCX documents to Markdown.
#[derive(Clone)]
pub struct Converter {
    config: ConversionConfig,
    store: Arc<dyn ImageStore>,
    rewriter: Arc<dyn TextRewriter>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Build a converter from explicit collaborators.
    pub fn new(
        config: ConversionConfig,
        store: Arc<dyn ImageStore>,
        rewriter: Arc<dyn TextRewriter>,
    ) -> Self {
        Self {
            config,
            store,
            rewriter,
        }
    }

    /// Build the default collaborators from `config`: the image store named
    /// by `config.image_output` and an LLM rewriter.
    ///
    /// Fails when no LLM provider can be resolved.
    pub fn from_config(config: ConversionConfig) -> Result<Self, Doc2MdError> {
        let rewriter = Arc::new(LlmRewriter::from_config(&config)?);
        let store = store_for(&config.image_output);
        Ok(Self::new(config, store, rewriter))
    }

    /// Like [`Converter::from_config`] but rewriting is the identity. Needs no
    /// API key.
    pub fn offline(config: ConversionConfig) -> Self {
        let store = store_for(&config.image_output);
        Self::new(config, store, Arc::new(PassthroughRewriter))
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert one uploaded document.
    ///
    /// `filename` decides the format; `bytes` is the raw file.
    pub async fn convert_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<ConversionOutput, Doc2MdError> {
        let started = Instant::now();
        info!("Starting conversion: '{}' ({} bytes)", filename, bytes.len());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(filename, bytes.len());
        }

        let mut tracker = StageTracker::new(filename, &self.config);
        match self.run(&mut tracker, filename, bytes, started).await {
            Ok(output) => {
                tracker.enter(ConversionStage::Completed);
                info!(
                    "Conversion complete: '{}' ({:?}, {} image(s), {} warning(s), {}ms)",
                    filename,
                    output.status,
                    output.images.len(),
                    output.warnings.len(),
                    output.stats.total_duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_conversion_complete(filename, output.images.len(), output.warnings.len());
                }
                Ok(output)
            }
            Err(e) => {
                error!(
                    "Conversion failed at stage {}: '{}': {}",
                    tracker.current, filename, e
                );
                tracker.enter(ConversionStage::Failed);
                Err(e)
            }
        }
    }

    /// Convert a local path or an HTTP/HTTPS URL.
    pub async fn convert_path(&self, input_str: &str) -> Result<ConversionOutput, Doc2MdError> {
        let doc = input::load_input(input_str, self.config.download_timeout_secs).await?;
        self.convert_bytes(&doc.filename, &doc.bytes).await
    }

    /// Convert and write the Markdown to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn convert_to_file(
        &self,
        input_str: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<ConversionOutput, Doc2MdError> {
        let output = self.convert_path(input_str).await?;
        write_atomic(output_path.as_ref(), &output.markdown).await?;
        Ok(output)
    }

    /// Check the image store and the rewriter.
    pub async fn health(&self) -> HealthReport {
        let mut details = Vec::new();

        let storage_reachable = match self.store.check().await {
            Ok(()) => true,
            Err(e) => {
                details.push(format!("storage: {}", e));
                false
            }
        };
        let rewriter_reachable = match self.rewriter.check().await {
            Ok(()) => true,
            Err(e) => {
                details.push(format!("rewriter: {}", e));
                false
            }
        };

        HealthReport {
            storage_reachable,
            rewriter_reachable,
            details,
        }
    }

    async fn run(
        &self,
        tracker: &mut StageTracker<'_>,
        filename: &str,
        bytes: &[u8],
        started: Instant,
    ) -> Result<ConversionOutput, Doc2MdError> {
        // ── Received: reject before parsing anything ─────────────────────
        let format = input::check_request(filename, bytes)?;

        // ── Extracting ───────────────────────────────────────────────────
        tracker.enter(ConversionStage::Extracting);
        let extract_start = Instant::now();
        let extracted = extract::extract(format, filename, bytes).await?;
        let stats = ConversionStats {
            extract_duration_ms: extract_start.elapsed().as_millis() as u64,
            ..ConversionStats::default()
        };
        self.process_extracted(tracker, filename, extracted, stats, started)
            .await
    }

    /// Every stage after extraction. Nothing here fails the request.
    async fn process_extracted(
        &self,
        tracker: &mut StageTracker<'_>,
        filename: &str,
        extracted: ExtractedDocument,
        mut stats: ConversionStats,
        started: Instant,
    ) -> Result<ConversionOutput, Doc2MdError> {
        let config = &self.config;
        let mut warnings: Vec<StageWarning> = Vec::new();

        stats.pages = extracted.pages.len();
        stats.elements = extracted.element_count();
        stats.images_found = extracted.image_count();
        warnings.extend(skipped_warnings(&extracted));
        info!(
            "'{}': extracted {} element(s), {} image(s) from {} page(s) in {}ms",
            filename, stats.elements, stats.images_found, stats.pages, stats.extract_duration_ms
        );

        if extracted.is_empty() {
            info!("'{}': no extractable content", filename);
            stats.total_duration_ms = started.elapsed().as_millis() as u64;
            return Ok(ConversionOutput {
                status: ConversionStatus::NoContent,
                markdown: NO_CONTENT_MARKDOWN.to_string(),
                filename: filename.to_string(),
                images: Vec::new(),
                placeholders: PlaceholderMap::default(),
                warnings,
                stats,
            });
        }

        // ── Linearizing ──────────────────────────────────────────────────
        tracker.enter(ConversionStage::Linearizing);
        let linear = linearize::linearize(&extracted, config);
        drop(extracted);
        debug!(
            "'{}': {} linear item(s), {} image(s)",
            filename,
            linear.items.len(),
            linear.image_count()
        );

        // ── Encoding ─────────────────────────────────────────────────────
        tracker.enter(ConversionStage::Encoding);
        let encoded = placeholder::encode(&linear, self.store.as_ref()).await;
        drop(linear);
        stats.images_stored = encoded.map.len();
        warnings.extend(encoded.warnings);

        // ── Rewriting ────────────────────────────────────────────────────
        tracker.enter(ConversionStage::Rewriting);
        let rewrite_start = Instant::now();
        let chunks = chunk::split_chunks(&encoded.text, config.max_input_chars);
        stats.chunks = chunks.len();
        let report = rewrite::rewrite_document(self.rewriter.as_ref(), &chunks, config, filename).await;
        stats.fallback_chunks = report.fallback_chunks;
        stats.rewrite_duration_ms = rewrite_start.elapsed().as_millis() as u64;
        warnings.extend(report.warnings);
        let rewritten = report.chunks.join("\n\n");

        // ── Decoding ─────────────────────────────────────────────────────
        tracker.enter(ConversionStage::Decoding);
        let decoded = placeholder::decode(&rewritten, &encoded.map);
        stats.images_appended = decoded.appended.len();
        warnings.extend(decoded.appended.iter().map(|p| StageWarning::PlaceholderRecovered {
            placeholder: p.to_string(),
        }));

        // ── Verifying ────────────────────────────────────────────────────
        tracker.enter(ConversionStage::Verifying);
        let mut markdown = postprocess::finalize_document(&decoded.markdown);
        if markdown.trim().is_empty() {
            warn!("'{}': nothing left after rewriting", filename);
            markdown = NO_CONTENT_MARKDOWN.to_string();
        }
        let injected = placeholder::ensure_all_present(&mut markdown, &encoded.map);
        if !injected.is_empty() {
            warn!(
                "'{}': {} image reference(s) re-injected during verification",
                filename,
                injected.len()
            );
            stats.images_appended += injected.len();
            warnings.extend(injected.iter().map(|p| StageWarning::PlaceholderRecovered {
                placeholder: p.to_string(),
            }));
        }

        stats.total_duration_ms = started.elapsed().as_millis() as u64;
        let status = if warnings.is_empty() {
            ConversionStatus::Success
        } else {
            ConversionStatus::Degraded
        };

        Ok(ConversionOutput {
            status,
            markdown,
            filename: filename.to_string(),
            images: encoded.map.records().to_vec(),
            placeholders: encoded.map,
            warnings,
            stats,
        })
    }
}

// ── Free-function entry points ───────────────────────────────────────────

/// Convert a local path or URL with collaborators derived from `config`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2md::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = convert("report.docx", &ConversionConfig::default()).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    Converter::from_config(config.clone())?
        .convert_path(input_str.as_ref())
        .await
}

/// Convert in-memory bytes with collaborators derived from `config`.
pub async fn convert_from_bytes(
    filename: &str,
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    Converter::from_config(config.clone())?
        .convert_bytes(filename, bytes)
        .await
}

/// Convert and write the result to `output_path` atomically.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Doc2MdError> {
    Converter::from_config(config.clone())?
        .convert_to_file(input_str.as_ref(), output_path)
        .await
        .map(|output| output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn store_for(output: &ImageOutput) -> Arc<dyn ImageStore> {
    match output {
        ImageOutput::Inline => Arc::new(InlineImageStore),
        ImageOutput::Directory { path, url_prefix } => {
            Arc::new(DirectoryImageStore::new(path.clone(), url_prefix.clone()))
        }
    }
}

fn skipped_warnings(doc: &ExtractedDocument) -> impl Iterator<Item = StageWarning> + '_ {
    doc.skipped
        .iter()
        .map(|(page, detail)| StageWarning::PartialExtraction {
            page: *page,
            detail: detail.clone(),
        })
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), Doc2MdError> {
    let write_err = |source| Doc2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}
