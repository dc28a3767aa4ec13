//! Routing Engine (C5): classifies a natural-language query to one or more
//! policy vector tables, fans out to C3 in parallel, and merges the
//! results into a single globally-ranked list.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::gateway::Gateway;
use crate::llm::router::ModelRole;
use crate::llm::{CompletionRequest, Message};
use crate::validator::validate_json_response;
use crate::vector::{VectorMatch, VectorSearchClient, VectorTable};

const ROUTING_SYSTEM_PROMPT: &str = r#"Route this travel insurance query to the correct database table(s).

TABLES:
1. general_conditions - Policy eligibility, age limits, trip origin requirements, universal exclusions (pre-existing conditions, dangerous activities, prohibited destinations)
2. benefits - Coverage types, benefit amounts, coverage limits, what's covered
3. benefit_conditions - Claim requirements, time limits, minimum thresholds, proof requirements, benefit-specific exclusions

ROUTING LOGIC:
- Eligibility/age/trip requirements/general exclusions -> ["general_conditions"]
- Coverage types/benefit amounts/limits -> ["benefits"]
- Claim requirements/documentation/thresholds -> ["benefit_conditions"]
- Broad comparison/analysis -> multiple tables
- Very general questions -> all three tables

Return ONLY valid JSON: {"tables": ["table_name1", "table_name2"]}

Query: "#;

#[derive(Debug, Deserialize)]
struct RoutingDecision {
    tables: Vec<String>,
}

/// Outcome of a routing call: either a merged result set or a failure that
/// survived every retry.
#[derive(Debug)]
pub enum RoutingOutcome {
    /// Routing and search succeeded.
    Success {
        /// Tables the classifier selected and that were actually searched.
        tables_searched: Vec<String>,
        /// Globally re-ranked matches across all searched tables.
        results: Vec<VectorMatch>,
    },
    /// The classifier never produced a usable table set, or every search failed.
    Failed,
}

/// Classifies `query` against the three policy vector tables and merges
/// the per-table search results into a single globally-ranked list.
///
/// # Errors
///
/// Returns an error only when `query` is empty or `top_k` is out of range;
/// classifier/search failures are represented as [`RoutingOutcome::Failed`]
/// rather than propagated, matching the component's `(status_code, results)`
/// contract.
pub async fn route(
    gateway: &Gateway,
    vector_client: Arc<VectorSearchClient>,
    query: &str,
    top_k: usize,
    max_retries: u32,
) -> Result<RoutingOutcome, RoutingError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(RoutingError::EmptyQuery);
    }
    if top_k == 0 || top_k > 50 {
        return Err(RoutingError::TopKOutOfRange(top_k));
    }

    let Some(tables) = classify_with_retries(gateway, trimmed, max_retries).await else {
        return Ok(RoutingOutcome::Failed);
    };

    let searches = tables.iter().map(|table| {
        let vector_client = Arc::clone(&vector_client);
        let table = *table;
        async move { (table, vector_client.search(table, trimmed, top_k).await) }
    });

    let outcomes: Vec<_> = futures_util::future::join_all(searches).await;

    let mut results = Vec::new();
    for (_, outcome) in outcomes {
        match outcome {
            Ok(matches) => results.extend(matches),
            Err(_) => return Ok(RoutingOutcome::Failed),
        }
    }

    merge_and_rank(&mut results);

    Ok(RoutingOutcome::Success {
        tables_searched: tables.iter().map(|t| t.as_str().to_owned()).collect(),
        results,
    })
}

async fn classify_with_retries(
    gateway: &Gateway,
    query: &str,
    max_retries: u32,
) -> Option<Vec<VectorTable>> {
    let attempts = max_retries.max(1);
    for _ in 0..attempts {
        let Ok(response) = gateway
            .chat(
                ModelRole::Router,
                CompletionRequest {
                    model: String::new(),
                    messages: vec![Message::system(format!("{ROUTING_SYSTEM_PROMPT}{query}"))],
                    temperature: 0.0,
                    max_tokens: 100,
                    json_mode: true,
                    timeout: None,
                },
            )
            .await
        else {
            continue;
        };

        let outcome = validate_json_response(&response.content, &["tables"]);
        if !outcome.is_valid {
            continue;
        }

        let Some(parsed) = outcome.parsed else {
            continue;
        };
        let Ok(decision) = serde_json::from_value::<RoutingDecision>(parsed) else {
            continue;
        };

        let tables: Vec<VectorTable> = decision
            .tables
            .iter()
            .filter_map(|name| VectorTable::parse(name))
            .collect();

        if !tables.is_empty() {
            return Some(tables);
        }
    }
    None
}

/// Sorts matches by descending `similarity_score`, preserving each row's
/// original per-table order on ties (a stable sort achieves this directly
/// since rows are concatenated table-by-table in selection order).
fn merge_and_rank(results: &mut [VectorMatch]) {
    results.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Input-validation errors from [`route`].
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// `query` was empty or all whitespace.
    #[error("query must not be empty")]
    EmptyQuery,
    /// `top_k` was outside the accepted `[1, 50]` range.
    #[error("top_k must be in 1..=50, got {0}")]
    TopKOutOfRange(usize),
}

impl crate::error::ToSurface for RoutingError {
    fn surface_kind(&self) -> crate::error::SurfaceKind {
        crate::error::SurfaceKind::InvalidArgument
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_and_rank_sorts_descending_and_is_stable_on_ties() {
        let mut results = vec![
            VectorMatch {
                id: "a".to_owned(),
                table: "benefits".to_owned(),
                content: String::new(),
                similarity_score: 0.5,
                metadata: serde_json::Value::Null,
            },
            VectorMatch {
                id: "b".to_owned(),
                table: "general_conditions".to_owned(),
                content: String::new(),
                similarity_score: 0.9,
                metadata: serde_json::Value::Null,
            },
            VectorMatch {
                id: "c".to_owned(),
                table: "benefits".to_owned(),
                content: String::new(),
                similarity_score: 0.5,
                metadata: serde_json::Value::Null,
            },
        ];
        merge_and_rank(&mut results);
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "a");
        assert_eq!(results[2].id, "c");
    }
}
