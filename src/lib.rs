//! # edgequake-doc2md
//!
//! Convert PDF and DOCX documents to Markdown, keeping every embedded image at
//! the place it appeared in the document.
//!
//! ## Why this crate?
//!
//! Asking a language model to turn raw document text into Markdown gives
//! good structure but loses images: the model never sees them, and anything
//! it does not understand it tends to drop. This crate extracts text and
//! images with their positions, replaces each image by a short opaque token
//! the model is told to copy verbatim, and swaps the tokens back for real image
//! references afterwards. Tokens that the model loses are recovered, and a
//! rewrite that loses too much text is replaced by a deterministic fallback.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / DOCX
//!  │
//!  ├─ 1. Extract     positioned text and image elements (pdfium / OOXML)
//!  ├─ 2. Linearize   reading order: top-to-bottom, left-to-right
//!  ├─ 3. Encode      store each image, put [[IMG_PLACEHOLDER_n]] in its place
//!  ├─ 4. Rewrite     chunked LLM rewrite with timeout, retry and loss check
//!  ├─ 5. Decode      tokens → ![description](reference)
//!  └─ 6. Verify      every stored image is referenced exactly once
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{ConversionConfig, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let converter = Converter::from_config(ConversionConfig::default())?;
//!     let bytes = std::fs::read("report.docx")?;
//!     let output = converter.convert_bytes("report.docx", &bytes).await?;
//!     println!("{}", output.markdown);
//!     for warning in &output.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF support
//!
//! PDF extraction needs a pdfium shared library at runtime. It is looked up
//! in `PDFIUM_LIB_PATH`, then the working directory, then the system library
//! path. DOCX needs nothing beyond this crate.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod element;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod placeholder;
pub mod progress;
pub mod prompts;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageOutput, PageSeparator};
pub use convert::{
    convert, convert_from_bytes, convert_sync, convert_to_file, ConversionStage, Converter,
    HealthReport, NO_CONTENT_MARKDOWN,
};
pub use element::DocumentFormat;
pub use error::{Doc2MdError, StageWarning};
pub use output::{ConversionOutput, ConversionStats, ConversionStatus, ImageRecord};
pub use pipeline::llm::{
    LlmRewriter, PassthroughRewriter, RewriteConstraints, RewriteError, TextRewriter,
};
pub use placeholder::{Placeholder, PlaceholderMap};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::{DirectoryImageStore, ImageStore, InlineImageStore, StorageError};
