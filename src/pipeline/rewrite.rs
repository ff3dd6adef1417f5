//! Rewrite adapter: drive a [`TextRewriter`] over every chunk and never let a
//! bad rewrite reach the output.
//!
//! ## Guarantees
//!
//! Each chunk comes back as Markdown, one way or another. The rewriter's
//! output is accepted only when the call succeeded within the timeout and it
//! kept at least `min_word_ratio` of the input's words. Otherwise the chunk is
//! formatted deterministically by [`fallback::format_chunk`], which keeps
//! every word, and a [`StageWarning`] says why.
//!
//! ## Retry
//!
//! Errors and timeouts are retried up to `max_retries` times with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`). A lossy rewrite is not
//! retried: the call succeeded, the answer is just not trustworthy.
//!
//! ## Concurrency
//!
//! Chunks are independent, so up to `concurrency` calls are in flight at once.
//! `buffered` (not `buffer_unordered`) keeps results in chunk order.

use crate::config::ConversionConfig;
use crate::error::StageWarning;
use crate::pipeline::fallback;
use crate::pipeline::llm::{RewriteConstraints, RewriteError, TextRewriter};
use crate::pipeline::postprocess;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Why a chunk was formatted by the fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Failed { attempts: u32, detail: String },
    Timeout { secs: u64 },
    ContentLoss { input_words: usize, output_words: usize },
}

impl FallbackReason {
    fn into_warning(self, chunk: usize) -> StageWarning {
        match self {
            FallbackReason::Failed { attempts, detail } => StageWarning::RewriteFailed {
                chunk,
                attempts,
                detail,
            },
            FallbackReason::Timeout { secs } => StageWarning::RewriteTimeout { chunk, secs },
            FallbackReason::ContentLoss {
                input_words,
                output_words,
            } => StageWarning::ContentLossDetected {
                chunk,
                input_words,
                output_words,
            },
        }
    }
}

/// Result for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Rewritten(String),
    Fallback {
        markdown: String,
        reason: FallbackReason,
    },
}

impl ChunkOutcome {
    pub fn markdown(&self) -> &str {
        match self {
            ChunkOutcome::Rewritten(md) => md,
            ChunkOutcome::Fallback { markdown, .. } => markdown,
        }
    }

    pub fn fell_back(&self) -> bool {
        matches!(self, ChunkOutcome::Fallback { .. })
    }
}

/// Limits for the adapter, separate from what is passed to the rewriter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewritePolicy {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub concurrency: usize,
    pub min_word_ratio: f32,
}

impl RewritePolicy {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            timeout_secs: config.rewrite_timeout_secs,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            concurrency: config.concurrency.max(1),
            min_word_ratio: config.min_word_ratio,
        }
    }
}

/// All chunks of a document after rewriting, in order.
#[derive(Debug, Clone, Default)]
pub struct RewriteReport {
    pub chunks: Vec<String>,
    pub warnings: Vec<StageWarning>,
    pub fallback_chunks: usize,
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// `true` when `output` kept at least `min_ratio` of `input`'s words.
///
/// An input without words passes whatever comes back.
pub fn passes_word_ratio(input: &str, output: &str, min_ratio: f32) -> bool {
    let input_words = word_count(input);
    if input_words == 0 {
        return true;
    }
    let ratio = word_count(output) as f64 / input_words as f64;
    ratio >= f64::from(min_ratio)
}

/// Rewrite one chunk with timeout, retry and content-loss check.
///
/// `title` is used by the fallback for the first chunk only.
pub async fn rewrite_chunk(
    rewriter: &dyn TextRewriter,
    chunk: &str,
    constraints: &RewriteConstraints,
    policy: &RewritePolicy,
    title: Option<&str>,
) -> ChunkOutcome {
    let (index, total) = constraints.part;
    let limit = Duration::from_secs(policy.timeout_secs);
    let mut last: Option<FallbackReason> = None;
    let mut attempts = 0u32;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.retry_backoff_ms * 2u64.pow(attempt - 1);
            debug!(
                "Chunk {}/{}: retry {}/{} after {}ms",
                index, total, attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts = attempt + 1;

        match timeout(limit, rewriter.rewrite(chunk, constraints)).await {
            Ok(Ok(raw)) => {
                let cleaned = postprocess::clean_rewrite(&raw, chunk);
                if passes_word_ratio(chunk, &cleaned, policy.min_word_ratio) {
                    return ChunkOutcome::Rewritten(cleaned);
                }
                let reason = FallbackReason::ContentLoss {
                    input_words: word_count(chunk),
                    output_words: word_count(&cleaned),
                };
                warn!("Chunk {}/{}: {:?}, using fallback", index, total, reason);
                return fall_back(chunk, title, reason);
            }
            Ok(Err(err)) => {
                warn!("Chunk {}/{}: attempt {} failed: {}", index, total, attempts, err);
                let retryable = !matches!(err, RewriteError::InputTooLarge { .. });
                last = Some(FallbackReason::Failed {
                    attempts,
                    detail: err.to_string(),
                });
                if !retryable {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    "Chunk {}/{}: attempt {} timed out after {}s",
                    index, total, attempts, policy.timeout_secs
                );
                last = Some(FallbackReason::Timeout {
                    secs: policy.timeout_secs,
                });
            }
        }
    }

    let reason = match last {
        Some(FallbackReason::Failed { detail, .. }) => FallbackReason::Failed { attempts, detail },
        Some(other) => other,
        None => FallbackReason::Failed {
            attempts,
            detail: "no attempt was made".to_string(),
        },
    };
    fall_back(chunk, title, reason)
}

fn fall_back(chunk: &str, title: Option<&str>, reason: FallbackReason) -> ChunkOutcome {
    ChunkOutcome::Fallback {
        markdown: fallback::format_chunk(chunk, title),
        reason,
    }
}

/// Rewrite every chunk of a document. Never fails.
pub async fn rewrite_document(
    rewriter: &dyn TextRewriter,
    chunks: &[String],
    config: &ConversionConfig,
    filename: &str,
) -> RewriteReport {
    let total = chunks.len();
    let policy = RewritePolicy::from_config(config);
    let base = RewriteConstraints::from_config(config);
    let title = fallback::title_from_filename(filename);

    info!(
        "Rewriting {} chunk(s) (concurrency={})",
        total, policy.concurrency
    );

    let outcomes: Vec<ChunkOutcome> = stream::iter(chunks.iter().enumerate())
        .map(|(i, chunk)| {
            let constraints = base.for_part(i + 1, total);
            let title = (i == 0).then_some(title.as_str());
            let policy = &policy;
            async move {
                let outcome = rewrite_chunk(rewriter, chunk, &constraints, policy, title).await;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_chunk_complete(i + 1, total, outcome.fell_back());
                }
                outcome
            }
        })
        .buffered(policy.concurrency)
        .collect()
        .await;

    let mut report = RewriteReport::default();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            ChunkOutcome::Rewritten(md) => report.chunks.push(md),
            ChunkOutcome::Fallback { markdown, reason } => {
                report.fallback_chunks += 1;
                report.warnings.push(reason.into_warning(i + 1));
                report.chunks.push(markdown);
            }
        }
    }

    info!(
        "Rewrite complete: {}/{} chunk(s) used the fallback",
        report.fallback_chunks, total
    );
    report
}
