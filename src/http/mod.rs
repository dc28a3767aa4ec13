//! HTTP ingress: the second ingress path alongside the MCP stdio server
//! (`crate::tools::mcp`), sharing the same [`ToolRegistry`](crate::tools::ToolRegistry)
//! dispatch table for every tool-backed endpoint. Two endpoints bypass the
//! registry and talk to their component directly: claims analysis (there is
//! no MCP tool for it by design) and the payment webhook receiver (which
//! isn't a tool call at all — it's a provider-initiated delivery).

pub mod handlers;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::claims::orchestrator::ClaimsOrchestrator;
use crate::payment::webhook::WebhookReceiver;
use crate::payment::PaymentOrchestrator;
use crate::tools::ToolRegistry;

/// Shared state handed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Shared tool dispatch table (structured/concept search, memory, purchase tools).
    pub tools: Arc<ToolRegistry>,
    /// Claims Intelligence Orchestrator, called directly (the one HTTP
    /// endpoint not backed by the tool registry).
    pub claims: Arc<ClaimsOrchestrator>,
    /// Payment Orchestrator, called directly by the purchase-lifecycle
    /// handlers rather than indirecting through `tools::call`.
    pub payments: Arc<PaymentOrchestrator>,
    /// Webhook Receiver, wired to the provider delivery endpoint.
    pub webhooks: Arc<WebhookReceiver>,
    /// Maximum topics a single claims analysis request may request.
    pub claims_max_topics: usize,
}

/// Builds the full router: every route from the specification's HTTP
/// surface, plus tracing and permissive CORS layers.
#[must_use]
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/api/v1/structured-policy-search",
            post(handlers::structured_policy_search),
        )
        .route("/api/v1/concept-search", post(handlers::concept_search))
        .route("/api/v1/memory/add", post(handlers::memory_add))
        .route("/api/v1/memory/search", post(handlers::memory_search))
        .route(
            "/api/v1/memory/:id",
            get(handlers::memory_all).delete(handlers::memory_delete),
        )
        .route("/api/v1/claims/analyze", post(handlers::claims_analyze))
        .route("/api/purchase/initiate", post(handlers::purchase_initiate))
        .route("/api/purchase/payment/:payment_intent_id", get(handlers::purchase_status))
        .route(
            "/api/purchase/complete/:payment_intent_id",
            post(handlers::purchase_complete),
        )
        .route(
            "/api/purchase/cancel/:payment_intent_id",
            post(handlers::purchase_cancel),
        )
        .route("/api/purchase/user/:user_id/payments", get(handlers::purchase_list_by_user))
        .route("/webhook/stripe", post(handlers::stripe_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(Any),
        )
}
