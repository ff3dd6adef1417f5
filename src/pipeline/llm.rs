//! Rewrite collaborator: turn linear text into Markdown.
//!
//! The pipeline only depends on the [`TextRewriter`] trait. It is a black
//! box that may fail, time out, or silently drop text; the adapter in
//! [`crate::pipeline::rewrite`] guards against all three. This module holds
//! the production implementation backed by `edgequake-llm`, an identity
//! implementation for offline use, and provider resolution.
//!
//! All prompt engineering lives in [`crate::prompts`].

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Limits passed along with each rewrite call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewriteConstraints {
    pub max_input_chars: usize,
    pub temperature: f32,
    pub max_output_tokens: usize,
    /// `(index, total)` of this chunk, 1-indexed.
    pub part: (usize, usize),
}

impl RewriteConstraints {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            max_input_chars: config.max_input_chars,
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            part: (1, 1),
        }
    }

    pub fn for_part(self, index: usize, total: usize) -> Self {
        Self {
            part: (index, total),
            ..self
        }
    }
}

/// Errors a rewriter may return. Always absorbed by the pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RewriteError {
    /// The backend returned an error.
    #[error("rewriter call failed: {0}")]
    Backend(String),

    /// The input exceeds what the backend accepts.
    #[error("input of {chars} chars exceeds the {limit} char budget")]
    InputTooLarge { chars: usize, limit: usize },
}

/// Text → Markdown rewriting.
#[async_trait]
pub trait TextRewriter: Send + Sync {
    async fn rewrite(
        &self,
        text: &str,
        constraints: &RewriteConstraints,
    ) -> Result<String, RewriteError>;

    /// Check the backend is reachable.
    async fn check(&self) -> Result<(), RewriteError> {
        Ok(())
    }
}

// ── LLM-backed rewriter ──────────────────────────────────────────────────

/// Rewriter backed by any `edgequake-llm` chat provider.
pub struct LlmRewriter {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
}

impl LlmRewriter {
    pub fn new(provider: Arc<dyn LLMProvider>, custom_prompt: Option<&str>) -> Self {
        Self {
            provider,
            system_prompt: prompts::system_prompt(custom_prompt),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Doc2MdError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.system_prompt.as_deref()))
    }
}

#[async_trait]
impl TextRewriter for LlmRewriter {
    async fn rewrite(
        &self,
        text: &str,
        constraints: &RewriteConstraints,
    ) -> Result<String, RewriteError> {
        let chars = text.chars().count();
        if chars > constraints.max_input_chars {
            return Err(RewriteError::InputTooLarge {
                chars,
                limit: constraints.max_input_chars,
            });
        }

        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(prompts::chunk_message(text, constraints.part)),
        ];
        let options = build_options(constraints);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| RewriteError::Backend(e.to_string()))?;

        debug!(
            "Part {}/{}: {} input tokens, {} output tokens",
            constraints.part.0,
            constraints.part.1,
            response.prompt_tokens,
            response.completion_tokens
        );
        Ok(response.content)
    }

    async fn check(&self) -> Result<(), RewriteError> {
        let messages = vec![ChatMessage::user("Reply with OK.")];
        let options = CompletionOptions {
            max_tokens: Some(4),
            ..Default::default()
        };
        self.provider
            .chat(&messages, Some(&options))
            .await
            .map(|_| ())
            .map_err(|e| RewriteError::Backend(e.to_string()))
    }
}

/// Build `CompletionOptions` from the rewrite constraints.
fn build_options(constraints: &RewriteConstraints) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(constraints.temperature),
        max_tokens: Some(constraints.max_output_tokens),
        ..Default::default()
    }
}

// ── Identity rewriter ────────────────────────────────────────────────────

/// Returns its input unchanged. Used by `--offline`: every chunk then goes
/// through extraction, linearization and placeholder decoding, but no model.
#[derive(Debug, Clone, Default)]
pub struct PassthroughRewriter;

#[async_trait]
impl TextRewriter for PassthroughRewriter {
    async fn rewrite(
        &self,
        text: &str,
        _constraints: &RewriteConstraints,
    ) -> Result<String, RewriteError> {
        Ok(text.to_string())
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Doc2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Doc2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`DEFAULT_MODEL`]. The factory reads the matching API key.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
///    when both are set and non-empty.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, so users holding several keys
///    get a predictable default.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Doc2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Doc2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Use --offline to convert without a model.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let constraints = RewriteConstraints::from_config(&ConversionConfig::default());
        let opts = build_options(&constraints);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn for_part_keeps_limits() {
        let c = RewriteConstraints::from_config(&ConversionConfig::default()).for_part(2, 5);
        assert_eq!(c.part, (2, 5));
        assert_eq!(c.max_input_chars, 12_000);
    }

    #[tokio::test]
    async fn passthrough_is_identity() {
        let c = RewriteConstraints::from_config(&ConversionConfig::default());
        let out = PassthroughRewriter
            .rewrite("# Title\n\n[[IMG_PLACEHOLDER_1]]", &c)
            .await
            .unwrap();
        assert_eq!(out, "# Title\n\n[[IMG_PLACEHOLDER_1]]");
        assert!(PassthroughRewriter.check().await.is_ok());
    }
}
