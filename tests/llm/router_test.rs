use waypoint::config::{AmbientConfig, Config, Environment, LimitsConfig, ModelsConfig, PaymentConfig, StoresConfig};
use waypoint::llm::router::{ModelRole, ModelRouter};

fn test_config(router_model: &str, planner_model: &str) -> Config {
    Config {
        environment: Environment::Development,
        models: ModelsConfig {
            router_model: router_model.to_owned(),
            planner_model: planner_model.to_owned(),
            sql_model: "openai/gpt-4.1".to_owned(),
            synth_model: "openai/o3".to_owned(),
            embedding_model: "openai/text-embedding-3-large".to_owned(),
            embedding_dimensions: 3072,
        },
        limits: LimitsConfig {
            max_routing_retries: 3,
            claims_max_topics: 10,
            claims_phase_timeout_secs: 120,
            llm_max_inflight_per_model: 10,
            embedding_cache_size: 10_000,
        },
        payment: PaymentConfig {
            currency_default: "SGD".to_owned(),
            checkout_session_ttl_secs: 86_400,
            webhook_secret: None,
            success_url: "https://app.example.com/payment/success".to_owned(),
            cancel_url: "https://app.example.com/payment/cancel".to_owned(),
        },
        stores: StoresConfig {
            openai_api_key: "sk-test".to_owned(),
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            anthropic_api_key: "sk-ant-test".to_owned(),
            anthropic_base_url: "https://api.anthropic.com/v1".to_owned(),
            claims_database_url: "postgres://localhost/claims".to_owned(),
            payments_database_url: "postgres://localhost/payments".to_owned(),
            vector_store_database_url: "postgres://localhost/vectors".to_owned(),
            graph_store_base_url: "https://graph.example.com".to_owned(),
            graph_store_api_key: None,
            payment_provider_base_url: "https://api.stripe.com/v1".to_owned(),
            payment_provider_api_key: "sk_test".to_owned(),
            issuance_api_base_url: "https://issuance.example.com".to_owned(),
            issuance_api_key: "key".to_owned(),
            memory_provider_base_url: "https://api.mem0.ai/v1".to_owned(),
            memory_provider_api_key: "key".to_owned(),
        },
        ambient: AmbientConfig {
            log_dir: None,
            http_bind_addr: "0.0.0.0:8080".to_owned(),
        },
    }
}

#[test]
fn shared_provider_is_instantiated_once_across_roles() {
    let config = test_config("openai/gpt-4o-mini", "anthropic/claude-3-opus");
    let router = ModelRouter::from_config(&config).unwrap();

    let (router_provider, router_model) = router.resolve(ModelRole::Router).unwrap();
    assert_eq!(router_model, "gpt-4o-mini");
    assert_eq!(router_provider.provider_name(), "openai");

    let (planner_provider, planner_model) = router.resolve(ModelRole::Planner).unwrap();
    assert_eq!(planner_model, "claude-3-opus");
    assert_eq!(planner_provider.provider_name(), "anthropic");

    let (embedding_provider, embedding_model) = router.resolve_embedding().unwrap();
    assert_eq!(embedding_model, "text-embedding-3-large");
    assert_eq!(embedding_provider.provider_name(), "openai");
}

#[test]
fn malformed_model_spec_fails_at_construction() {
    let config = test_config("not-a-valid-spec", "openai/o3");
    assert!(ModelRouter::from_config(&config).is_err());
}

#[test]
fn unsupported_provider_prefix_is_treated_as_openai_compatible() {
    // The router has no registry of "known" provider names beyond
    // anthropic/openai -- any other prefix falls through to the
    // OpenAI-compatible path (self-hosted gateways), so this never fails
    // at construction; only a request against it could.
    let config = test_config("local-vllm/llama-3", "openai/o3");
    let router = ModelRouter::from_config(&config).unwrap();
    let (provider, model) = router.resolve(ModelRole::Router).unwrap();
    assert_eq!(model, "llama-3");
    assert_eq!(provider.provider_name(), "openai");
}
