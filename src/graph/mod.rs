//! Graph Concept Search (C4): semantic search over a precomputed,
//! tree-structured concept index, reached over HTTP rather than a native
//! graph-database driver — this process never holds a direct Neo4j/Bolt
//! connection, only a bearer-authenticated client to the graph store's
//! search endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{SurfaceKind, ToSurface};

const MIN_TOP_K: usize = 1;
const MAX_TOP_K: usize = 50;
/// Nodes whose memory text is this short or shorter are pure concept
/// labels with no substantive content, and are filtered from results.
const MIN_MEMORY_CHARS: usize = 100;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<ConceptNode>,
}

#[derive(Debug, Deserialize)]
struct ConceptNode {
    memory: String,
}

/// Errors from graph concept search.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// `query` was empty or all whitespace.
    #[error("search query must not be empty")]
    EmptyQuery,
    /// `top_k` was outside the accepted `[1, 50]` range.
    #[error("top_k must be in 1..=50, got {0}")]
    TopKOutOfRange(usize),
    /// The graph store's HTTP request failed.
    #[error("graph store request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The graph store responded with a non-success status.
    #[error("graph store returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

impl ToSurface for GraphError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::EmptyQuery | Self::TopKOutOfRange(_) => SurfaceKind::InvalidArgument,
            Self::Request(_) | Self::HttpStatus { .. } => SurfaceKind::Unavailable,
        }
    }
}

/// Bearer-authenticated client for the graph store's concept-search endpoint.
#[derive(Debug, Clone)]
pub struct GraphConceptClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GraphConceptClient {
    /// Builds a client pointed at `base_url` (no trailing slash), optionally
    /// authenticating with `api_key`.
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Searches for insurance concepts matching `query`, returning concept
    /// memory strings filtered to those at least [`MIN_MEMORY_CHARS`] long.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EmptyQuery`] or [`GraphError::TopKOutOfRange`]
    /// on invalid input, or a request/status error otherwise.
    pub async fn search_concepts(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, GraphError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(GraphError::EmptyQuery);
        }
        if top_k < MIN_TOP_K || top_k > MAX_TOP_K {
            return Err(GraphError::TopKOutOfRange(top_k));
        }

        let mut request = self
            .client
            .post(format!("{}/concepts/search", self.base_url))
            .json(&SearchRequest {
                query: trimmed,
                top_k,
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GraphError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| GraphError::HttpStatus {
                status: status.as_u16(),
                body: format!("failed to parse graph store response: {e}"),
            })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|node| node.memory)
            .filter(|memory| memory.len() >= MIN_MEMORY_CHARS)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_query() {
        let client = GraphConceptClient::new("http://localhost:9999".to_owned(), None);
        let err = client.search_concepts("   ", 10).await.unwrap_err();
        assert!(matches!(err, GraphError::EmptyQuery));
    }

    #[tokio::test]
    async fn rejects_top_k_out_of_range() {
        let client = GraphConceptClient::new("http://localhost:9999".to_owned(), None);
        assert!(matches!(
            client.search_concepts("baggage", 0).await.unwrap_err(),
            GraphError::TopKOutOfRange(0)
        ));
        assert!(matches!(
            client.search_concepts("baggage", 51).await.unwrap_err(),
            GraphError::TopKOutOfRange(51)
        ));
    }
}
