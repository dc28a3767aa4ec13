//! Process entry point: loads configuration, wires every component, and
//! runs the HTTP ingress and the MCP stdio server side by side in one
//! process until either exits.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use waypoint::claims::{ClaimsOrchestrator, ClaimsSandbox};
use waypoint::config::Config;
use waypoint::graph::GraphConceptClient;
use waypoint::http::{self, AppState};
use waypoint::llm::Gateway;
use waypoint::logging;
use waypoint::memory::MemoryClient;
use waypoint::payment::provider::PaymentProviderClient;
use waypoint::payment::selection::SelectionStore;
use waypoint::payment::store::PaymentStore;
use waypoint::payment::webhook::WebhookReceiver;
use waypoint::payment::PaymentOrchestrator;
use waypoint::quotation::QuotationClient;
use waypoint::tools::ToolRegistry;
use waypoint::vector::VectorSearchClient;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let _logging_guard = match &config.ambient.log_dir {
        Some(dir) => Some(logging::init_production(std::path::Path::new(dir))?),
        None => {
            logging::init_cli();
            None
        }
    };

    info!(environment = ?config.environment, "waypoint starting");

    let gateway = Arc::new(Gateway::from_config(&config).context("failed to build LLM gateway")?);

    let vector_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.stores.vector_store_database_url)
        .await
        .context("failed to connect to vector store database")?;
    let vector_client = Arc::new(VectorSearchClient::new(
        vector_pool,
        Arc::clone(&gateway),
        config.limits.embedding_cache_size,
        config.models.embedding_dimensions,
    ));

    let graph_client = Arc::new(GraphConceptClient::new(
        config.stores.graph_store_base_url.clone(),
        config.stores.graph_store_api_key.clone(),
    ));

    let claims_sandbox = Arc::new(
        ClaimsSandbox::connect(&config.stores.claims_database_url)
            .await
            .context("failed to connect to claims database")?,
    );
    let claims_orchestrator = Arc::new(ClaimsOrchestrator::new(
        Arc::clone(&gateway),
        Arc::clone(&claims_sandbox),
        std::time::Duration::from_secs(config.limits.claims_phase_timeout_secs),
    ));

    let quotation_client = Arc::new(QuotationClient::new(
        config.stores.issuance_api_base_url.clone(),
        config.stores.issuance_api_key.clone(),
    ));

    let payment_store = Arc::new(
        PaymentStore::connect(&config.stores.payments_database_url)
            .await
            .context("failed to connect to payments database")?,
    );
    let selection_store = Arc::new(
        SelectionStore::connect(&config.stores.payments_database_url)
            .await
            .context("failed to connect to selections database")?,
    );
    let payment_provider = Arc::new(PaymentProviderClient::new(
        config.stores.payment_provider_base_url.clone(),
        config.stores.payment_provider_api_key.clone(),
        config.payment.success_url.clone(),
        config.payment.cancel_url.clone(),
    ));
    let payment_orchestrator = Arc::new(PaymentOrchestrator::new(
        Arc::clone(&payment_store),
        Arc::clone(&selection_store),
        Arc::clone(&payment_provider),
        Arc::clone(&quotation_client),
        config.payment.checkout_session_ttl_secs,
    ));
    let webhook_receiver = Arc::new(WebhookReceiver::new(
        Arc::clone(&payment_store),
        config.payment.webhook_secret.clone(),
        config.environment,
    ));

    let memory_client = Arc::new(MemoryClient::new(
        config.stores.memory_provider_base_url.clone(),
        config.stores.memory_provider_api_key.clone(),
    ));

    let tool_registry = Arc::new(ToolRegistry::new(
        Arc::clone(&gateway),
        Arc::clone(&vector_client),
        Arc::clone(&graph_client),
        Arc::clone(&memory_client),
        Arc::clone(&payment_orchestrator),
        config.limits.max_routing_retries,
    ));

    let state = AppState {
        tools: Arc::clone(&tool_registry),
        claims: Arc::clone(&claims_orchestrator),
        payments: Arc::clone(&payment_orchestrator),
        webhooks: Arc::clone(&webhook_receiver),
        claims_max_topics: config.limits.claims_max_topics,
    };

    let bind_addr = config.ambient.http_bind_addr.clone();
    let http_server = async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {bind_addr}"))?;
        info!(addr = %listener.local_addr()?, "HTTP ingress listening");
        axum::serve(listener, http::routes(state))
            .await
            .context("HTTP server exited")
    };

    let mcp_server = async move {
        waypoint::tools::mcp::serve(tool_registry, tokio::io::stdin(), tokio::io::stdout())
            .await
            .context("MCP stdio server exited")
    };

    tokio::try_join!(http_server, mcp_server)?;

    Ok(())
}
