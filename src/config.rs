//! Configuration loading and validation.
//!
//! A single [`Config`] is built once at process startup from environment
//! variables (optionally merged over a local `.env` file via `dotenvy` for
//! development) and validated eagerly — missing or malformed required
//! fields fail the process before any request is served, rather than
//! surfacing as a runtime error on first use.

use std::env;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Deployment environment; gates webhook signature leniency (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; lenient webhook signature acceptance permitted.
    Development,
    /// Staging; lenient webhook signature acceptance permitted.
    Staging,
    /// Production; webhook signatures are always required and verified.
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(anyhow!("unrecognized ENVIRONMENT value: {other}")),
        }
    }

    /// Whether this environment permits accepting unsigned webhook payloads.
    #[must_use]
    pub fn allows_lenient_webhooks(self) -> bool {
        !matches!(self, Self::Production)
    }
}

/// Per-role/skill model routing table for the LLM gateway (C2).
#[derive(Debug, Clone)]
pub struct ModelsConfig {
    /// Fast model used by the Routing Engine (C5) classifier call.
    pub router_model: String,
    /// Reasoning model used by the Claims Orchestrator's planner phase (P1).
    pub planner_model: String,
    /// Precise model used by the Claims Orchestrator's SQL-generation phase (P2).
    pub sql_model: String,
    /// Reasoning model used by the Claims Orchestrator's synthesis phase (P4).
    pub synth_model: String,
    /// Embedding model used by C3/C4 for query and document vectors.
    pub embedding_model: String,
    /// Embedding vector dimension; asserted against store schema at startup.
    pub embedding_dimensions: usize,
}

/// Retry/concurrency knobs shared across components.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum routing classification retries (C5), default 3.
    pub max_routing_retries: u32,
    /// Maximum claims topics per analysis (C7), default 10.
    pub claims_max_topics: usize,
    /// Per-phase deadline for the claims orchestrator, in seconds.
    pub claims_phase_timeout_secs: u64,
    /// Maximum in-flight LLM calls per model (C2), default 10.
    pub llm_max_inflight_per_model: usize,
    /// Bounded LRU size for the embedding cache (C3), default 10,000.
    pub embedding_cache_size: usize,
}

/// Payment-related configuration.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Default currency code (ISO 4217) when not specified by the caller.
    pub currency_default: String,
    /// Checkout session time-to-live, in seconds (default 24h).
    pub checkout_session_ttl_secs: i64,
    /// Shared secret used to verify webhook signatures.
    pub webhook_secret: Option<String>,
    /// Redirect target after a successful checkout (provider appends its session id).
    pub success_url: String,
    /// Redirect target when the customer cancels checkout.
    pub cancel_url: String,
}

/// External store/provider connection configuration.
#[derive(Debug, Clone)]
pub struct StoresConfig {
    /// API key for OpenAI-compatible chat/embeddings providers.
    pub openai_api_key: String,
    /// Base URL for OpenAI-compatible providers (self-hosted gateways may override).
    pub openai_base_url: String,
    /// API key for the Anthropic messages API.
    pub anthropic_api_key: String,
    /// Base URL for the Anthropic messages API.
    pub anthropic_base_url: String,
    /// Postgres DSN for the read-only claims warehouse (C6).
    pub claims_database_url: String,
    /// Postgres DSN for the payment/application-state store (C9), used as
    /// a key-value table indexed by `payment_intent_id`, `user_id`, `quote_id`.
    pub payments_database_url: String,
    /// Postgres DSN for the vector-extended policy store (C3).
    pub vector_store_database_url: String,
    /// Base URL of the graph store's semantic-search endpoint (C4).
    pub graph_store_base_url: String,
    /// Bearer credential for the graph store.
    pub graph_store_api_key: Option<String>,
    /// Base URL of the payment provider's API (C9/C10).
    pub payment_provider_base_url: String,
    /// API key for the payment provider.
    pub payment_provider_api_key: String,
    /// Base URL of the insurance issuance/pricing API (C8).
    pub issuance_api_base_url: String,
    /// API key for the issuance API.
    pub issuance_api_key: String,
    /// Base URL of the managed conversational-memory provider (C11).
    pub memory_provider_base_url: String,
    /// API key for the memory provider.
    pub memory_provider_api_key: String,
}

/// Ambient process configuration: logging, HTTP bind address.
#[derive(Debug, Clone)]
pub struct AmbientConfig {
    /// Directory for daily-rotating JSON log files; empty disables file logging.
    pub log_dir: Option<String>,
    /// Address the HTTP/tool ingress binds to.
    pub http_bind_addr: String,
}

/// Top-level process configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment.
    pub environment: Environment,
    /// Model routing table.
    pub models: ModelsConfig,
    /// Retry/concurrency limits.
    pub limits: LimitsConfig,
    /// Payment configuration.
    pub payment: PaymentConfig,
    /// External store/provider configuration.
    pub stores: StoresConfig,
    /// Ambient process configuration.
    pub ambient: AmbientConfig,
}

fn env_var(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing required environment variable: {key}"))
}

fn env_var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    env_var_opt(key).unwrap_or_else(|| default.to_owned())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow!("invalid value for {key}: {raw}")),
    }
}

impl Config {
    /// Loads configuration from the process environment, optionally
    /// merging a `.env` file first (development convenience only — real
    /// process environment variables always take precedence).
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value
    /// fails to parse or validate.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let environment = Environment::parse(&env_var_or("ENVIRONMENT", "development"))?;

        let models = ModelsConfig {
            router_model: env_var_or("LLM_ROUTER_MODEL", "openai/gpt-4o-mini"),
            planner_model: env_var_or("LLM_PLANNER_MODEL", "openai/o3"),
            sql_model: env_var_or("LLM_SQL_MODEL", "openai/gpt-4.1"),
            synth_model: env_var_or("LLM_SYNTH_MODEL", "openai/o3"),
            embedding_model: env_var_or("EMBEDDING_MODEL", "openai/text-embedding-3-large"),
            embedding_dimensions: env_parse_or("EMBEDDING_DIMENSIONS", 3072usize)?,
        };

        let limits = LimitsConfig {
            max_routing_retries: env_parse_or("MAX_ROUTING_RETRIES", 3u32)?,
            claims_max_topics: env_parse_or("CLAIMS_MAX_TOPICS", 10usize)?,
            claims_phase_timeout_secs: env_parse_or("CLAIMS_PHASE_TIMEOUT_SECS", 120u64)?,
            llm_max_inflight_per_model: env_parse_or("LLM_MAX_INFLIGHT_PER_MODEL", 10usize)?,
            embedding_cache_size: env_parse_or("EMBEDDING_CACHE_SIZE", 10_000usize)?,
        };

        if limits.claims_max_topics == 0 || limits.claims_max_topics > 10 {
            return Err(anyhow!(
                "CLAIMS_MAX_TOPICS must be in 1..=10, got {}",
                limits.claims_max_topics
            ));
        }

        let payment = PaymentConfig {
            currency_default: env_var_or("PAYMENT_CURRENCY_DEFAULT", "SGD"),
            checkout_session_ttl_secs: env_parse_or("CHECKOUT_SESSION_TTL_SECS", 86_400i64)?,
            webhook_secret: env_var_opt("PAYMENT_PROVIDER_WEBHOOK_SECRET"),
            success_url: env_var_or("PAYMENT_SUCCESS_URL", "https://app.example.com/payment/success"),
            cancel_url: env_var_or("PAYMENT_CANCEL_URL", "https://app.example.com/payment/cancel"),
        };

        if environment == Environment::Production && payment.webhook_secret.is_none() {
            return Err(anyhow!(
                "PAYMENT_PROVIDER_WEBHOOK_SECRET is required in production"
            ));
        }

        let stores = StoresConfig {
            openai_api_key: env_var("OPENAI_API_KEY")?,
            openai_base_url: env_var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            anthropic_api_key: env_var("ANTHROPIC_API_KEY")?,
            anthropic_base_url: env_var_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1"),
            claims_database_url: env_var("CLAIMS_DATABASE_URL")?,
            payments_database_url: env_var("PAYMENTS_DATABASE_URL")?,
            vector_store_database_url: env_var("VECTOR_STORE_DATABASE_URL")?,
            graph_store_base_url: env_var("GRAPH_STORE_BASE_URL")?,
            graph_store_api_key: env_var_opt("GRAPH_STORE_API_KEY"),
            payment_provider_base_url: env_var_or(
                "PAYMENT_PROVIDER_BASE_URL",
                "https://api.stripe.com/v1",
            ),
            payment_provider_api_key: env_var("PAYMENT_PROVIDER_API_KEY")?,
            issuance_api_base_url: env_var("ISSUANCE_API_BASE_URL")?,
            issuance_api_key: env_var("ISSUANCE_API_KEY")?,
            memory_provider_base_url: env_var_or(
                "MEMORY_PROVIDER_BASE_URL",
                "https://api.mem0.ai/v1",
            ),
            memory_provider_api_key: env_var("MEMORY_PROVIDER_API_KEY")?,
        };

        let ambient = AmbientConfig {
            log_dir: env_var_opt("LOG_DIR"),
            http_bind_addr: env_var_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
        };

        Ok(Self {
            environment,
            models,
            limits,
            payment,
            stores,
            ambient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_known_values() {
        assert_eq!(Environment::parse("production").unwrap(), Environment::Production);
        assert_eq!(Environment::parse("PROD").unwrap(), Environment::Production);
        assert_eq!(Environment::parse("dev").unwrap(), Environment::Development);
        assert!(Environment::parse("nonsense").is_err());
    }

    #[test]
    fn production_requires_strict_webhooks() {
        assert!(!Environment::Production.allows_lenient_webhooks());
        assert!(Environment::Development.allows_lenient_webhooks());
        assert!(Environment::Staging.allows_lenient_webhooks());
    }
}
