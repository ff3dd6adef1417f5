//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Collaborators (image store, rewriter)
//! are not global: [`crate::convert::Converter`] receives them at construction,
//! either explicitly or derived from this config by
//! [`crate::convert::Converter::from_config`].

use crate::error::Doc2MdError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a document-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use edgequake_doc2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_input_chars(8_000)
///     .rewrite_timeout_secs(30)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Character budget per rewrite call. Default: 12 000.
    ///
    /// Text longer than this is split on paragraph boundaries and each chunk
    /// is rewritten independently. Keep it well under the model's context
    /// window: the prompt and the response share that window.
    pub max_input_chars: usize,

    /// Minimum output/input word ratio for a rewrite to be accepted. Default: 0.7.
    ///
    /// A chunk whose rewrite falls below this ratio is treated as lossy and
    /// replaced by the deterministic fallback formatting of the original.
    pub min_word_ratio: f32,

    /// Vertical distance (document units) within which PDF elements share a
    /// line. Default: 5.0.
    pub line_tolerance: f32,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the rewrite. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the rewriter may generate per chunk. Default: 4096.
    pub max_tokens: usize,

    /// Per-call rewrite timeout in seconds. Default: 60.
    ///
    /// A timeout is handled exactly like a rewrite failure.
    pub rewrite_timeout_secs: u64,

    /// Retries per chunk on rewriter error or timeout. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Number of chunks rewritten concurrently. Output order is preserved. Default: 4.
    pub concurrency: usize,

    /// Custom rewrite system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Marker placed between PDF pages. Default: horizontal rule.
    pub page_separator: PageSeparator,

    /// Where extracted images are materialized. Default: inline data URIs.
    pub image_output: ImageOutput,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional stage/chunk progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 12_000,
            min_word_ratio: 0.7,
            line_tolerance: 5.0,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            rewrite_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            concurrency: 4,
            system_prompt: None,
            page_separator: PageSeparator::default(),
            image_output: ImageOutput::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_input_chars", &self.max_input_chars)
            .field("min_word_ratio", &self.min_word_ratio)
            .field("line_tolerance", &self.line_tolerance)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("rewrite_timeout_secs", &self.rewrite_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("page_separator", &self.page_separator)
            .field("image_output", &self.image_output)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_input_chars(mut self, n: usize) -> Self {
        self.config.max_input_chars = n;
        self
    }

    pub fn min_word_ratio(mut self, ratio: f32) -> Self {
        self.config.min_word_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn line_tolerance(mut self, units: f32) -> Self {
        self.config.line_tolerance = units.max(0.0);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn rewrite_timeout_secs(mut self, secs: u64) -> Self {
        self.config.rewrite_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn image_output(mut self, output: ImageOutput) -> Self {
        self.config.image_output = output;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if c.max_input_chars < 256 {
            return Err(Doc2MdError::InvalidConfig(format!(
                "max_input_chars must be ≥ 256, got {}",
                c.max_input_chars
            )));
        }
        if c.rewrite_timeout_secs == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "rewrite_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Doc2MdError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if let ImageOutput::Directory { ref path, .. } = c.image_output {
            if path.as_os_str().is_empty() {
                return Err(Doc2MdError::InvalidConfig(
                    "image directory must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate PDF pages in the linear text. DOCX has no pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No marker; pages joined as ordinary paragraphs.
    None,
    /// Horizontal rule: "---" on its own paragraph. (default)
    #[default]
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// The marker paragraph placed before page `page_num` (1-indexed), if any.
    pub fn render(&self, page_num: usize) -> Option<String> {
        match self {
            PageSeparator::None => None,
            PageSeparator::HorizontalRule => Some("---".to_string()),
            PageSeparator::Comment => Some(format!("<!-- page {} -->", page_num)),
            PageSeparator::Custom(s) => Some(s.clone()),
        }
    }
}

/// Where materialized images go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ImageOutput {
    /// Embed each image as a `data:` URI in the Markdown. (default)
    #[default]
    Inline,
    /// Write each image to `path`; reference it as `url_prefix/name`, or as
    /// `path/name` when no prefix is given.
    Directory {
        path: PathBuf,
        url_prefix: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_canonical_policy() {
        let c = ConversionConfig::default();
        assert_eq!(c.min_word_ratio, 0.7);
        assert_eq!(c.line_tolerance, 5.0);
        assert_eq!(c.temperature, 0.2);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.page_separator, PageSeparator::HorizontalRule);
        assert_eq!(c.image_output, ImageOutput::Inline);
    }

    #[test]
    fn builder_clamps() {
        let c = ConversionConfig::builder()
            .min_word_ratio(3.0)
            .temperature(-1.0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.min_word_ratio, 1.0);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_tiny_budget() {
        let err = ConversionConfig::builder()
            .max_input_chars(10)
            .build()
            .unwrap_err();
        assert!(matches!(err, Doc2MdError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(ConversionConfig::builder()
            .rewrite_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn separator_render() {
        assert_eq!(PageSeparator::None.render(2), None);
        assert_eq!(PageSeparator::HorizontalRule.render(2).as_deref(), Some("---"));
        assert_eq!(
            PageSeparator::Comment.render(3).as_deref(),
            Some("<!-- page 3 -->")
        );
        assert_eq!(
            PageSeparator::Custom("***".into()).render(4).as_deref(),
            Some("***")
        );
    }
}
