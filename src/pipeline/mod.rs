//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap a
//! collaborator (rewriter, image store) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ linearize ──▶ placeholder::encode ──▶ chunk
//! (bytes)   (pdfium/   (reading      (images → store,       (paragraph
//!            OOXML)     order)        tokens in text)         packing)
//!
//!       ──▶ rewrite ──▶ placeholder::decode ──▶ postprocess
//!           (LLM or      (tokens → image         (whitespace,
//!            fallback)    references)             final newline)
//! ```
//!
//! 1. [`input`]    : validate the file name and body, or load a path/URL
//! 2. [`extract`]  : positioned elements; runs in `spawn_blocking`
//! 3. [`linearize`]: one linear sequence of paragraphs and images
//! 4. [`chunk`]    : split the encoded text under the rewriter's budget
//! 5. [`rewrite`]  : timeout, retry, content-loss check and [`fallback`]
//! 6. [`postprocess`]: deterministic cleanup of rewriter quirks
//!
//! [`encode`] holds the PNG/data-URI helpers used by extraction and storage;
//! [`llm`] holds the rewriter trait and its implementations.

pub mod chunk;
pub mod encode;
pub mod extract;
pub mod fallback;
pub mod input;
pub mod linearize;
pub mod llm;
pub mod postprocess;
pub mod rewrite;
