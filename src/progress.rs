//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as a request moves through the conversion stages and as rewrite
//! chunks complete.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionConfig, ConversionProgressCallback, ConversionStage};
//! use std::sync::{Arc, Mutex};
//!
//! struct StageLog(Mutex<Vec<ConversionStage>>);
//!
//! impl ConversionProgressCallback for StageLog {
//!     fn on_stage(&self, _filename: &str, stage: ConversionStage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let log = Arc::new(StageLog(Mutex::new(Vec::new())));
//! let config = ConversionConfig::builder()
//!     .progress_callback(log as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::convert::ConversionStage;
use std::sync::Arc;

/// Called by the conversion pipeline as a request advances.
///
/// Chunks may be rewritten concurrently, so `on_chunk_complete` can be called
/// from several tasks at once. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once when a request is accepted.
    fn on_conversion_start(&self, filename: &str, size_bytes: usize) {
        let _ = (filename, size_bytes);
    }

    /// Called on every state-machine transition, including `Failed`.
    fn on_stage(&self, filename: &str, stage: ConversionStage) {
        let _ = (filename, stage);
    }

    /// Called when one rewrite chunk is done.
    ///
    /// # Arguments
    /// * `chunk`      : 1-indexed chunk number
    /// * `total`      : number of chunks
    /// * `fell_back`  : `true` when the deterministic fallback was used
    fn on_chunk_complete(&self, chunk: usize, total: usize, fell_back: bool) {
        let _ = (chunk, total, fell_back);
    }

    /// Called once after the request completed successfully.
    fn on_conversion_complete(&self, filename: &str, images: usize, warnings: usize) {
        let _ = (filename, images, warnings);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
