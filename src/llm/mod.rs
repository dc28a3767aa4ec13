//! LLM provider abstraction layer (C2 — LLM Gateway).
//!
//! Defines the [`LlmProvider`] trait and the shared request/response types
//! used by all provider implementations, plus [`Gateway`], the uniform
//! chat/embedding call surface with timeouts, retries, and bounded
//! concurrency that every other component calls through.
//!
//! Two providers are implemented:
//! - [`openai::OpenAiProvider`] — OpenAI-compatible `/chat/completions` and `/embeddings`
//! - [`anthropic::AnthropicProvider`] — Anthropic `/v1/messages`
//!
//! [`router::ModelRouter`] resolves the correct provider for each call based
//! on context (skill override → role override → default).

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod gateway;
pub mod openai;
pub mod router;

pub use gateway::Gateway;

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message.
    System,
    /// Human user message.
    User,
    /// Assistant (LLM) message.
    Assistant,
}

/// A single message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl Message {
    /// Builds a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Builds a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A request to an LLM provider for a chat completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model name understood by the target provider (without the
    /// `provider/` prefix — the gateway strips it during resolution).
    pub model: String,
    /// Conversation history including the latest user message.
    pub messages: Vec<Message>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Whether to request strict JSON-object output from the provider.
    pub json_mode: bool,
    /// Per-call timeout; overrides the gateway default when set.
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    /// Builds a request from a single system prompt, with gateway defaults.
    #[must_use]
    pub fn from_system_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(prompt)],
            temperature: 0.0,
            max_tokens: 1024,
            json_mode: false,
            timeout: None,
        }
    }
}

/// Usage statistics for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct UsageStats {
    /// Tokens used in the prompt/input.
    pub input_tokens: u32,
    /// Tokens generated in the response.
    pub output_tokens: u32,
}

/// The response from an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Response text content.
    pub content: String,
    /// Token usage for diagnostics.
    pub usage: UsageStats,
    /// The model identifier that served this response.
    pub model: String,
}

/// Errors returned by model providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure; retryable.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match expected schema; fatal.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream provider responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized, truncated response body.
        body: String,
    },
    /// Provider cannot satisfy the request with current configuration.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Caller misuse (e.g. empty messages) — never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether this error is worth retrying with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Unavailable(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Parse(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure, `ProviderError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk-ant-[A-Za-z0-9_\-]{10,}",
        r"sk-[A-Za-z0-9]{32,}",
        r"ghp_[A-Za-z0-9]{20,}",
        r"glpat-[A-Za-z0-9_\-]{16,}",
        r"xoxb-[A-Za-z0-9\-]{20,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

/// Core LLM provider interface: one chat backend plus its embeddings.
///
/// All provider implementations must be `Send + Sync` to allow use across
/// concurrent request handlers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Request a chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API, network, or parse failure.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Request embeddings for a batch of texts, returned in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API, network, or parse failure, or
    /// `InvalidRequest` when `texts` is empty.
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// The provider name this implementation answers for (e.g. `"openai"`).
    fn provider_name(&self) -> &'static str;
}

/// Parse a provider string like `"openai/gpt-4o-mini"` into components.
///
/// Returns `(provider_name, model_name)`.
///
/// # Errors
///
/// Returns an error if the string does not contain exactly one `/` separator.
pub fn parse_provider_string(s: &str) -> anyhow::Result<(&str, &str)> {
    let (provider, model) = s.split_once('/').ok_or_else(|| {
        anyhow::anyhow!("invalid provider string: {s:?}, expected format 'provider/model'")
    })?;
    if provider.is_empty() || model.is_empty() {
        anyhow::bail!("invalid provider string: {s:?}, both provider and model must be non-empty");
    }
    Ok((provider, model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_provider_string() {
        assert_eq!(
            parse_provider_string("openai/gpt-4o-mini").unwrap(),
            ("openai", "gpt-4o-mini")
        );
    }

    #[test]
    fn rejects_malformed_provider_string() {
        assert!(parse_provider_string("no-slash").is_err());
        assert!(parse_provider_string("/model").is_err());
        assert!(parse_provider_string("provider/").is_err());
    }

    #[test]
    fn sanitizes_secrets_and_truncates() {
        let body = format!("error sk-ant-{} more", "a".repeat(20));
        let sanitized = sanitize_http_error_body(&body);
        assert!(!sanitized.contains("sk-ant-a"));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn classifies_retryable_errors() {
        assert!(ProviderError::HttpStatus {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(ProviderError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::HttpStatus {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Parse(String::new()).is_retryable());
    }
}
