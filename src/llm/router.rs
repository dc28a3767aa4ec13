//! Resolves `provider/model` spec strings from [`ModelsConfig`] into
//! concrete [`LlmProvider`] instances.
//!
//! Unlike a skill/role override map, this router's resolution surface is
//! the four named call sites the rest of the system actually has: router,
//! planner, sql, and synth, plus the embedding model. Each is configured
//! independently as a full `provider/model` spec, so two roles can point at
//! the same provider with different models, or at different providers
//! entirely, without any implicit fallback chain to get wrong.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, ModelsConfig};

use super::anthropic::AnthropicProvider;
use super::openai::OpenAiProvider;
use super::LlmProvider;

/// Named call sites that resolve to a model spec via [`ModelsConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// Routing Engine (C5) classification call.
    Router,
    /// Claims Orchestrator planner phase (P1).
    Planner,
    /// Claims Orchestrator SQL-generation phase (P2).
    Sql,
    /// Claims Orchestrator synthesis phase (P4).
    Synth,
}

/// Provider routing errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Model spec is not in `<provider>/<model>` format.
    #[error("invalid model spec '{spec}', expected '<provider>/<model>'")]
    InvalidModelSpec {
        /// Invalid raw spec.
        spec: String,
    },
    /// Unsupported provider type in spec prefix.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider {
        /// Unsupported provider prefix.
        provider: String,
    },
}

/// Resolves a [`ModelRole`] (or the embedding model) to its provider and
/// bare model name.
#[derive(Clone)]
pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    role_specs: HashMap<ModelRole, String>,
    embedding_spec: String,
}

impl ModelRouter {
    /// Builds a router wiring every configured model spec to a provider
    /// instance, constructing each distinct `provider` at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured spec is malformed or names a
    /// provider this router does not implement.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let models = &config.models;
        let role_specs = HashMap::from([
            (ModelRole::Router, models.router_model.clone()),
            (ModelRole::Planner, models.planner_model.clone()),
            (ModelRole::Sql, models.sql_model.clone()),
            (ModelRole::Synth, models.synth_model.clone()),
        ]);

        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        for spec in role_specs
            .values()
            .chain(std::iter::once(&models.embedding_model))
        {
            let (provider_name, _) = super::parse_provider_string(spec)?;
            providers
                .entry(provider_name.to_owned())
                .or_insert_with(|| instantiate_provider(provider_name, config));
        }

        Ok(Self {
            providers,
            role_specs,
            embedding_spec: models.embedding_model.clone(),
        })
    }

    /// Builds a router backed by a single stub provider, for tests.
    #[doc(hidden)]
    pub fn for_testing(provider_name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(provider_name.to_owned(), provider);
        let test_spec = format!("{provider_name}/test-model");
        let role_specs = HashMap::from([
            (ModelRole::Router, test_spec.clone()),
            (ModelRole::Planner, test_spec.clone()),
            (ModelRole::Sql, test_spec.clone()),
            (ModelRole::Synth, test_spec),
        ]);
        Self {
            providers,
            role_specs,
            embedding_spec: format!("{provider_name}/test-embedding"),
        }
    }

    /// Resolves the provider and bare model name for a call-site role.
    ///
    /// # Errors
    ///
    /// Returns an error if no spec is configured for `role` or the
    /// provider is not registered.
    pub fn resolve(&self, role: ModelRole) -> Result<(Arc<dyn LlmProvider>, String), RouterError> {
        let spec = self
            .role_specs
            .get(&role)
            .ok_or_else(|| RouterError::InvalidModelSpec {
                spec: format!("{role:?}"),
            })?;
        self.resolve_spec(spec)
    }

    /// Resolves the embedding provider and bare model name.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding spec is malformed or unregistered.
    pub fn resolve_embedding(&self) -> Result<(Arc<dyn LlmProvider>, String), RouterError> {
        self.resolve_spec(&self.embedding_spec)
    }

    fn resolve_spec(&self, spec: &str) -> Result<(Arc<dyn LlmProvider>, String), RouterError> {
        let (provider_name, model_name) =
            super::parse_provider_string(spec).map_err(|_| RouterError::InvalidModelSpec {
                spec: spec.to_owned(),
            })?;
        let provider = self.providers.get(provider_name).cloned().ok_or_else(|| {
            RouterError::UnsupportedProvider {
                provider: provider_name.to_owned(),
            }
        })?;
        Ok((provider, model_name.to_owned()))
    }
}

fn instantiate_provider(provider_name: &str, config: &Config) -> Arc<dyn LlmProvider> {
    match provider_name {
        "anthropic" => Arc::new(AnthropicProvider::new(
            config.stores.anthropic_api_key.clone(),
            config.stores.anthropic_base_url.clone(),
        )),
        // Any other configured name is treated as OpenAI-compatible
        // (OpenAI itself, or a self-hosted gateway speaking the same wire
        // format) and routed through the shared base URL/key pair.
        _ => Arc::new(OpenAiProvider::new(
            config.stores.openai_api_key.clone(),
            config.stores.openai_base_url.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, ProviderError};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            unimplemented!("not exercised by these tests")
        }

        async fn embed(
            &self,
            _model: &str,
            _texts: &[String],
            _dimensions: usize,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            unimplemented!("not exercised by these tests")
        }

        fn provider_name(&self) -> &'static str {
            "openai"
        }
    }

    #[test]
    fn resolves_registered_role() {
        let mut router = ModelRouter::for_testing("openai", Arc::new(StubProvider));
        router
            .role_specs
            .insert(ModelRole::Router, "openai/gpt-4o-mini".to_owned());
        let (_, model) = router.resolve(ModelRole::Router).unwrap();
        assert_eq!(model, "gpt-4o-mini");
    }

    #[test]
    fn rejects_unregistered_provider() {
        let router = ModelRouter::for_testing("openai", Arc::new(StubProvider));
        let err = router.resolve_spec("anthropic/claude-3").unwrap_err();
        assert!(matches!(err, RouterError::UnsupportedProvider { .. }));
    }

    #[test]
    fn rejects_malformed_spec() {
        let router = ModelRouter::for_testing("openai", Arc::new(StubProvider));
        let err = router.resolve_spec("no-slash").unwrap_err();
        assert!(matches!(err, RouterError::InvalidModelSpec { .. }));
    }
}
