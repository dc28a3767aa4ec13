//! Uniform chat/embedding call surface: bounded in-flight concurrency per
//! model, retry with jittered backoff on transient failures, and per-call
//! timeout enforcement. Every other component calls the LLM only through
//! this gateway — never through a provider directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::backoff::jittered_backoff;
use crate::config::Config;

use super::router::{ModelRole, ModelRouter};
use super::{CompletionRequest, CompletionResponse, ProviderError};

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const SYNTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Gateway-level errors, surfaced after retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The underlying provider failed on every retry attempt.
    #[error("llm call failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Attempts made before giving up.
        attempts: u32,
        /// The final provider error.
        #[source]
        source: ProviderError,
    },
    /// The requested model spec could not be resolved to a provider.
    #[error("model routing failed: {0}")]
    Routing(#[from] super::router::RouterError),
    /// Per-call timeout elapsed before the provider responded.
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
}

impl crate::error::ToSurface for GatewayError {
    fn surface_kind(&self) -> crate::error::SurfaceKind {
        match self {
            Self::Exhausted { .. } | Self::Timeout(_) => crate::error::SurfaceKind::Unavailable,
            Self::Routing(_) => crate::error::SurfaceKind::Runtime,
        }
    }
}

/// Bounded, retrying, timeout-enforcing wrapper around [`ModelRouter`].
///
/// Semaphores are pre-built for every configured model spec at construction
/// time, so `chat`/`embed` only ever need a shared reference — the gateway
/// is meant to live behind a single `Arc` shared across request handlers.
#[derive(Clone)]
pub struct Gateway {
    router: ModelRouter,
    semaphores: HashMap<String, Arc<Semaphore>>,
    max_inflight_per_model: usize,
}

impl Gateway {
    /// Builds a gateway from configuration, wiring a [`ModelRouter`] and a
    /// per-model semaphore sized by `limits.llm_max_inflight_per_model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the router cannot be constructed.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let router = ModelRouter::from_config(config)?;
        let max_inflight_per_model = config.limits.llm_max_inflight_per_model;

        let models = &config.models;
        let known_models = [
            &models.router_model,
            &models.planner_model,
            &models.sql_model,
            &models.synth_model,
            &models.embedding_model,
        ];
        let mut semaphores = HashMap::new();
        for spec in known_models {
            if let Ok((_, model)) = super::parse_provider_string(spec) {
                semaphores
                    .entry(model.to_owned())
                    .or_insert_with(|| Arc::new(Semaphore::new(max_inflight_per_model)));
            }
        }

        Ok(Self {
            router,
            semaphores,
            max_inflight_per_model,
        })
    }

    fn semaphore_for(&self, model: &str) -> Arc<Semaphore> {
        self.semaphores.get(model).map_or_else(
            || Arc::new(Semaphore::new(self.max_inflight_per_model)),
            Arc::clone,
        )
    }

    /// Runs a chat completion for the given call-site role, enforcing
    /// bounded concurrency, retry-with-backoff, and a per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if routing fails, the timeout elapses, or
    /// every retry attempt is exhausted.
    pub async fn chat(
        &self,
        role: ModelRole,
        mut request: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let (provider, model) = self.router.resolve(role)?;
        request.model = model.clone();
        let timeout = request.timeout.unwrap_or(if matches!(role, ModelRole::Synth) {
            SYNTH_TIMEOUT
        } else {
            DEFAULT_TIMEOUT
        });

        let semaphore = self.semaphore_for(&model);
        let _permit = semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = provider.complete(request.clone());
            let outcome = tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| GatewayError::Timeout(timeout))?;

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = jittered_backoff(attempt);
                    warn!(
                        attempt,
                        model = %model,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying llm call"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(source) => {
                    return Err(GatewayError::Exhausted {
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }

    /// Requests embeddings for a batch of texts via the configured
    /// embedding model, with the same retry/backoff policy as [`Self::chat`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if routing fails or every retry attempt is
    /// exhausted.
    pub async fn embed(
        &self,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, GatewayError> {
        let (provider, model) = self.router.resolve_embedding()?;
        let semaphore = self.semaphore_for(&model);
        let _permit = semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(DEFAULT_TIMEOUT, provider.embed(&model, texts, dimensions))
                .await
                .map_err(|_| GatewayError::Timeout(DEFAULT_TIMEOUT))?;

            match outcome {
                Ok(embeddings) => return Ok(embeddings),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(jittered_backoff(attempt)).await;
                }
                Err(source) => {
                    return Err(GatewayError::Exhausted {
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }

    /// Builds a gateway backed by a single stub provider for every role and
    /// the embedding call, for use in downstream component tests.
    #[doc(hidden)]
    pub fn for_testing(provider_name: &str, provider: Arc<dyn super::LlmProvider>) -> Self {
        Self {
            router: ModelRouter::for_testing(provider_name, provider),
            semaphores: HashMap::new(),
            max_inflight_per_model: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};

    struct StubProvider;

    #[async_trait::async_trait]
    impl LlmProvider for StubProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            unimplemented!("not exercised by this test")
        }

        async fn embed(
            &self,
            _model: &str,
            _texts: &[String],
            _dimensions: usize,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            unimplemented!("not exercised by this test")
        }

        fn provider_name(&self) -> &'static str {
            "stub"
        }
    }

    #[test]
    fn semaphore_for_unknown_model_still_bounds_concurrency() {
        let gateway = Gateway::for_testing("stub", Arc::new(StubProvider));
        let sem = gateway.semaphore_for("unregistered-model");
        assert_eq!(sem.available_permits(), gateway.max_inflight_per_model);
    }
}
