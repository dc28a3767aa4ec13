//! Individual route handlers. Each tool-backed endpoint deserializes its
//! body/path/query into the JSON shape [`ToolRegistry::call`](crate::tools::ToolRegistry::call)
//! expects and forwards to it, so validation and dispatch logic lives in
//! exactly one place regardless of ingress.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::AppError;

use super::AppState;

#[instrument(skip_all)]
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

#[instrument(skip(state, body))]
pub async fn structured_policy_search(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let result = state.tools.call("structured_policy_search", body).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[instrument(skip(state, body))]
pub async fn concept_search(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let result = state.tools.call("concept_search", body).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[instrument(skip(state, body))]
pub async fn memory_add(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let result = state.tools.call("memory_add", body).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[instrument(skip(state, body))]
pub async fn memory_search(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let result = state.tools.call("memory_search", body).await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct MemoryAllQuery {
    #[serde(default)]
    limit: Option<u32>,
}

#[instrument(skip(state))]
pub async fn memory_all(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(_query): Query<MemoryAllQuery>,
) -> Result<Response, AppError> {
    let result = state
        .tools
        .call("memory_all", json!({"user_id": user_id}))
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[instrument(skip(state))]
pub async fn memory_delete(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
) -> Result<Response, AppError> {
    let result = state
        .tools
        .call("memory_delete", json!({"memory_id": memory_id}))
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ClaimsAnalyzeRequest {
    query: String,
    #[serde(default = "default_topic_count")]
    sql_num: usize,
}

fn default_topic_count() -> usize {
    3
}

/// The one endpoint not dispatched through [`ToolRegistry`](crate::tools::ToolRegistry):
/// there is no MCP tool for claims analysis, by design.
#[instrument(skip(state, body))]
pub async fn claims_analyze(
    State(state): State<AppState>,
    Json(body): Json<ClaimsAnalyzeRequest>,
) -> Result<Response, AppError> {
    if body.sql_num == 0 || body.sql_num > state.claims_max_topics {
        return Err(AppError::new(
            crate::error::SurfaceKind::InvalidArgument,
            format!(
                "sql_num must be in 1..={}, got {}",
                state.claims_max_topics, body.sql_num
            ),
        ));
    }

    let outcome = state.claims.analyze(&body.query, body.sql_num).await?;
    let response = match outcome {
        crate::claims::orchestrator::ClaimsAnalysisOutcome::Success { insights } => {
            json!({"status": "success", "insight": insights})
        }
        crate::claims::orchestrator::ClaimsAnalysisOutcome::Failed => {
            json!({"status": "failed", "insight": []})
        }
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[instrument(skip(state, body))]
pub async fn purchase_initiate(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let result = state.tools.call("purchase_initiate", body).await?;
    Ok((StatusCode::CREATED, Json(result)).into_response())
}

#[instrument(skip(state))]
pub async fn purchase_status(
    State(state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Result<Response, AppError> {
    let record = state.payments.status(&payment_intent_id).await?;
    Ok((StatusCode::OK, Json(record)).into_response())
}

#[instrument(skip(state))]
pub async fn purchase_complete(
    State(state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Result<Response, AppError> {
    let result = state.payments.complete(&payment_intent_id).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "policy_id": result.policy_id,
            "policy_number": result.policy_number,
            "external_purchase_id": result.external_purchase_id,
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize, Default)]
pub struct CancelBody {
    #[serde(default)]
    reason: Option<String>,
}

#[instrument(skip(state, body))]
pub async fn purchase_cancel(
    State(state): State<AppState>,
    Path(payment_intent_id): Path<String>,
    body: Option<Json<CancelBody>>,
) -> Result<Response, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    state.payments.cancel(&payment_intent_id, reason.as_deref()).await?;
    Ok((StatusCode::OK, Json(json!({"ok": true}))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListByUserQuery {
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    20
}

#[instrument(skip(state))]
pub async fn purchase_list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListByUserQuery>,
) -> Result<Response, AppError> {
    let records = state.payments.by_user(&user_id, query.limit).await?;
    Ok((StatusCode::OK, Json(json!({"results": records}))).into_response())
}

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[instrument(skip(state, headers, payload))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    payload: String,
) -> Result<Response, AppError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state.webhooks.handle(&payload, signature).await?;

    Ok((StatusCode::OK, Json(json!({"received": true}))).into_response())
}
