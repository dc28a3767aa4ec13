//! Tool Protocol Surface (C12): the tool definitions and dispatch table
//! shared by the MCP server ([`mcp`]) and the HTTP surface's request
//! validation (`crate::http`), so the two ingress paths describe the same
//! operations and cannot drift apart.

pub mod mcp;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::graph::GraphConceptClient;
use crate::llm::Gateway;
use crate::memory::{MemoryClient, MemoryMessage};
use crate::payment::{
    CheckoutResponse, CompletionResult, InitiateRequest, PaymentOrchestrator, SelectOfferRequest,
};
use crate::routing::{self, RoutingOutcome};
use crate::vector::VectorSearchClient;

/// One tool's name, human-readable description, and JSON Schema for its
/// arguments. The same list backs `tools/list` over MCP and input
/// validation on the HTTP surface.
#[derive(Debug, Clone)]
pub struct ToolDef {
    /// Tool name, used as the dispatch key by both ingress paths.
    pub name: &'static str,
    /// Human-readable description, shown to the driving agent.
    pub description: &'static str,
    /// JSON Schema describing the expected `arguments` object.
    pub input_schema: Value,
}

/// Returns the full set of tool definitions this process exposes.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "structured_policy_search",
            description: "Classify a travel insurance question to the relevant policy tables and search them for matching clauses.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "top_k": {"type": "integer", "minimum": 1, "maximum": 50, "default": 10}
                },
                "required": ["query"]
            }),
        },
        ToolDef {
            name: "concept_search",
            description: "Semantic search over the precomputed insurance concept graph.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "top_k": {"type": "integer", "minimum": 1, "maximum": 50, "default": 10}
                },
                "required": ["query"]
            }),
        },
        ToolDef {
            name: "memory_add",
            description: "Store memories extracted from a conversation turn for a user.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "messages": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "role": {"type": "string"},
                                "content": {"type": "string"}
                            },
                            "required": ["role", "content"]
                        }
                    },
                    "metadata": {"type": "object"}
                },
                "required": ["user_id", "messages"]
            }),
        },
        ToolDef {
            name: "memory_search",
            description: "Search a user's stored memories by semantic similarity to a query.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["user_id", "query"]
            }),
        },
        ToolDef {
            name: "memory_all",
            description: "List every stored memory for a user.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"}
                },
                "required": ["user_id"]
            }),
        },
        ToolDef {
            name: "memory_delete",
            description: "Delete a single memory by id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "memory_id": {"type": "string"}
                },
                "required": ["memory_id"]
            }),
        },
        ToolDef {
            name: "purchase_select_offer",
            description: "Record the traveler's chosen offer and insured parties for a quote, ahead of payment.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "quote_id": {"type": "string"},
                    "purchase_offers": {"type": "array", "items": {"type": "object"}},
                    "insureds": {"type": "array", "items": {"type": "object"}},
                    "main_contact": {"type": "object"},
                    "market": {"type": "string"},
                    "language_code": {"type": "string"},
                    "channel": {"type": "string"}
                },
                "required": ["quote_id", "purchase_offers", "insureds", "main_contact", "market", "language_code", "channel"]
            }),
        },
        ToolDef {
            name: "purchase_initiate",
            description: "Create a pending payment and checkout session for a quote.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "quote_id": {"type": "string"},
                    "amount": {"type": "integer", "minimum": 1},
                    "currency": {"type": "string"},
                    "product_name": {"type": "string"},
                    "customer_email": {"type": "string"}
                },
                "required": ["user_id", "quote_id", "amount", "currency", "product_name"]
            }),
        },
        ToolDef {
            name: "purchase_status",
            description: "Look up the current status of a payment.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "payment_intent_id": {"type": "string"}
                },
                "required": ["payment_intent_id"]
            }),
        },
        ToolDef {
            name: "purchase_complete",
            description: "Finalize a completed payment, issuing the policy.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "payment_intent_id": {"type": "string"}
                },
                "required": ["payment_intent_id"]
            }),
        },
        ToolDef {
            name: "purchase_cancel",
            description: "Cancel a payment that has not yet completed.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "payment_intent_id": {"type": "string"},
                    "reason": {"type": "string"}
                },
                "required": ["payment_intent_id"]
            }),
        },
        ToolDef {
            name: "purchase_list_by_user",
            description: "List a user's payments, most recent first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "default": 20}
                },
                "required": ["user_id"]
            }),
        },
    ]
}

/// Returns the definition for `name`, if one exists.
#[must_use]
pub fn find_tool(name: &str) -> Option<ToolDef> {
    tool_definitions().into_iter().find(|tool| tool.name == name)
}

#[derive(Debug, Deserialize)]
struct PolicySearchArgs {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
struct MemoryAddArgs {
    user_id: String,
    messages: Vec<MemoryMessage>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MemorySearchArgs {
    user_id: String,
    query: String,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UserIdArgs {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct MemoryIdArgs {
    memory_id: String,
}

#[derive(Debug, Deserialize)]
struct SelectOfferArgs {
    quote_id: String,
    purchase_offers: Vec<Value>,
    insureds: Vec<Value>,
    main_contact: Value,
    market: String,
    language_code: String,
    channel: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseInitiateArgs {
    user_id: String,
    quote_id: String,
    amount: i64,
    currency: String,
    product_name: String,
    #[serde(default)]
    customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentArgs {
    payment_intent_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelArgs {
    payment_intent_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListByUserArgs {
    user_id: String,
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    20
}

fn bad_args(name: &str, err: serde_json::Error) -> AppError {
    AppError::new(
        crate::error::SurfaceKind::InvalidArgument,
        format!("invalid arguments for tool {name}: {err}"),
    )
}

/// Holds the shared application components this process's tools dispatch
/// against. One instance is constructed at startup and shared by both
/// ingress paths via `Arc`.
pub struct ToolRegistry {
    gateway: Arc<Gateway>,
    vector_client: Arc<VectorSearchClient>,
    graph_client: Arc<GraphConceptClient>,
    memory_client: Arc<MemoryClient>,
    payments: Arc<PaymentOrchestrator>,
    max_routing_retries: u32,
}

impl ToolRegistry {
    /// Builds a registry over the shared application components.
    #[must_use]
    pub fn new(
        gateway: Arc<Gateway>,
        vector_client: Arc<VectorSearchClient>,
        graph_client: Arc<GraphConceptClient>,
        memory_client: Arc<MemoryClient>,
        payments: Arc<PaymentOrchestrator>,
        max_routing_retries: u32,
    ) -> Self {
        Self {
            gateway,
            vector_client,
            graph_client,
            memory_client,
            payments,
            max_routing_retries,
        }
    }

    /// Dispatches a tool call by name, returning its result as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when `name` is unknown, `arguments` does not
    /// match the tool's schema, or the underlying component call fails.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, AppError> {
        match name {
            "structured_policy_search" => self.structured_policy_search(arguments).await,
            "concept_search" => self.concept_search(arguments).await,
            "memory_add" => self.memory_add(arguments).await,
            "memory_search" => self.memory_search(arguments).await,
            "memory_all" => self.memory_all(arguments).await,
            "memory_delete" => self.memory_delete(arguments).await,
            "purchase_select_offer" => self.purchase_select_offer(arguments).await,
            "purchase_initiate" => self.purchase_initiate(arguments).await,
            "purchase_status" => self.purchase_status(arguments).await,
            "purchase_complete" => self.purchase_complete(arguments).await,
            "purchase_cancel" => self.purchase_cancel(arguments).await,
            "purchase_list_by_user" => self.purchase_list_by_user(arguments).await,
            other => Err(AppError::new(
                crate::error::SurfaceKind::NotFound,
                format!("unknown tool: {other}"),
            )),
        }
    }

    async fn structured_policy_search(&self, arguments: Value) -> Result<Value, AppError> {
        let args: PolicySearchArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("structured_policy_search", e))?;
        let outcome = routing::route(
            &self.gateway,
            Arc::clone(&self.vector_client),
            &args.query,
            args.top_k,
            self.max_routing_retries,
        )
        .await?;

        Ok(match outcome {
            RoutingOutcome::Success {
                tables_searched,
                results,
            } => json!({"status": "success", "tables_searched": tables_searched, "results": results}),
            RoutingOutcome::Failed => json!({"status": "failed", "tables_searched": [], "results": []}),
        })
    }

    async fn concept_search(&self, arguments: Value) -> Result<Value, AppError> {
        let args: PolicySearchArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("concept_search", e))?;
        let results = self.graph_client.search_concepts(&args.query, args.top_k).await?;
        Ok(json!({"results": results}))
    }

    async fn memory_add(&self, arguments: Value) -> Result<Value, AppError> {
        let args: MemoryAddArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("memory_add", e))?;
        let results = self
            .memory_client
            .add(&args.user_id, &args.messages, args.metadata.as_ref())
            .await?;
        Ok(json!({"results": results}))
    }

    async fn memory_search(&self, arguments: Value) -> Result<Value, AppError> {
        let args: MemorySearchArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("memory_search", e))?;
        let results = self
            .memory_client
            .search(&args.user_id, &args.query, args.limit)
            .await?;
        Ok(json!({"results": results}))
    }

    async fn memory_all(&self, arguments: Value) -> Result<Value, AppError> {
        let args: UserIdArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("memory_all", e))?;
        let results = self.memory_client.all(&args.user_id).await?;
        Ok(json!({"results": results}))
    }

    async fn memory_delete(&self, arguments: Value) -> Result<Value, AppError> {
        let args: MemoryIdArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("memory_delete", e))?;
        self.memory_client.delete(&args.memory_id).await?;
        Ok(json!({"ok": true}))
    }

    async fn purchase_select_offer(&self, arguments: Value) -> Result<Value, AppError> {
        let args: SelectOfferArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("purchase_select_offer", e))?;
        let record = self
            .payments
            .select_offer(SelectOfferRequest {
                quote_id: &args.quote_id,
                purchase_offers: args.purchase_offers,
                insureds: args.insureds,
                main_contact: args.main_contact,
                market: &args.market,
                language_code: &args.language_code,
                channel: &args.channel,
            })
            .await?;
        Ok(json!({"selection_id": record.selection_id, "quote_id": record.quote_id}))
    }

    async fn purchase_initiate(&self, arguments: Value) -> Result<Value, AppError> {
        let args: PurchaseInitiateArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("purchase_initiate", e))?;
        let response: CheckoutResponse = self
            .payments
            .initiate(InitiateRequest {
                user_id: &args.user_id,
                quote_id: &args.quote_id,
                amount: args.amount,
                currency: &args.currency,
                product_name: &args.product_name,
                customer_email: args.customer_email.as_deref(),
            })
            .await?;
        Ok(json!({
            "payment_intent_id": response.payment_intent_id,
            "checkout_url": response.checkout_url,
            "external_session_id": response.external_session_id,
            "amount": response.amount,
            "currency": response.currency,
            "expires_at": response.expires_at,
        }))
    }

    async fn purchase_status(&self, arguments: Value) -> Result<Value, AppError> {
        let args: PaymentIntentArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("purchase_status", e))?;
        let record = self.payments.status(&args.payment_intent_id).await?;
        Ok(serde_json::to_value(&record).unwrap_or(Value::Null))
    }

    async fn purchase_complete(&self, arguments: Value) -> Result<Value, AppError> {
        let args: PaymentIntentArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("purchase_complete", e))?;
        let result: CompletionResult = self.payments.complete(&args.payment_intent_id).await?;
        Ok(json!({
            "policy_id": result.policy_id,
            "policy_number": result.policy_number,
            "external_purchase_id": result.external_purchase_id,
        }))
    }

    async fn purchase_cancel(&self, arguments: Value) -> Result<Value, AppError> {
        let args: CancelArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("purchase_cancel", e))?;
        self.payments
            .cancel(&args.payment_intent_id, args.reason.as_deref())
            .await?;
        Ok(json!({"ok": true}))
    }

    async fn purchase_list_by_user(&self, arguments: Value) -> Result<Value, AppError> {
        let args: ListByUserArgs =
            serde_json::from_value(arguments).map_err(|e| bad_args("purchase_list_by_user", e))?;
        let records = self.payments.by_user(&args.user_id, args.limit).await?;
        Ok(json!({"results": records}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_have_unique_names() {
        let defs = tool_definitions();
        let mut names: Vec<_> = defs.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), defs.len());
    }

    #[test]
    fn find_tool_locates_known_tool() {
        assert!(find_tool("memory_search").is_some());
        assert!(find_tool("nonexistent").is_none());
    }
}
