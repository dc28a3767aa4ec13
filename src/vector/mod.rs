//! Vector Search Clients (C3): embedding-backed semantic search over the
//! three sibling policy vector tables (`general_conditions`, `benefits`,
//! `benefit_conditions`) plus the original-text chunk table, queried via
//! server-side stored procedures on the vector-extended Postgres store.
//!
//! Embeddings are generated through the shared [`Gateway`](crate::llm::Gateway)
//! and cached by exact query text in a bounded LRU so repeated questions
//! (a very common pattern in conversational search) skip the network call.

mod cache;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::error::{SurfaceKind, ToSurface};
use crate::llm::Gateway;

use cache::EmbeddingCache;

/// A searchable table backing a `search_{table}_vector` stored procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorTable {
    /// Eligibility, age limits, trip-origin requirements, universal exclusions.
    GeneralConditions,
    /// Coverage types, benefit amounts, coverage limits.
    Benefits,
    /// Claim requirements, time limits, proof/documentation thresholds.
    BenefitConditions,
    /// Chunked original policy text, independent of the structured rows above.
    OriginalText,
}

impl VectorTable {
    /// Wire name of this table, as used in `tables_searched` and routing output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneralConditions => "general_conditions",
            Self::Benefits => "benefits",
            Self::BenefitConditions => "benefit_conditions",
            Self::OriginalText => "original_text",
        }
    }

    /// Parses a table name as returned by the Routing Engine's classifier.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "general_conditions" => Some(Self::GeneralConditions),
            "benefits" => Some(Self::Benefits),
            "benefit_conditions" => Some(Self::BenefitConditions),
            "original_text" => Some(Self::OriginalText),
            _ => None,
        }
    }

    fn procedure_name(self) -> String {
        format!("search_{}_vector", self.as_str())
    }
}

/// A single vector search hit, tagged with the table it came from so
/// results from a multi-table fan-out can be merged without losing
/// provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Identifier of the matched row in its source table.
    pub id: String,
    /// The table this row was retrieved from.
    pub table: String,
    /// Indexed text content.
    pub content: String,
    /// Cosine similarity to the query, in `[0, 1]`.
    pub similarity_score: f64,
    /// Arbitrary metadata the stored procedure attaches (e.g. `product`).
    pub metadata: serde_json::Value,
}

/// Errors from vector search operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    /// `query` was empty or all whitespace.
    #[error("query must not be empty")]
    EmptyQuery,
    /// `top_k` was outside the accepted `[1, 50]` range.
    #[error("top_k must be in 1..=50, got {0}")]
    TopKOutOfRange(usize),
    /// Embedding generation failed.
    #[error("failed to embed query: {0}")]
    Embedding(#[from] crate::llm::gateway::GatewayError),
    /// The stored procedure call failed.
    #[error("vector store query failed: {0}")]
    Store(#[from] sqlx::Error),
}

impl ToSurface for VectorError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::EmptyQuery | Self::TopKOutOfRange(_) => SurfaceKind::InvalidArgument,
            Self::Embedding(_) | Self::Store(_) => SurfaceKind::Unavailable,
        }
    }
}

const MAX_TOP_K: usize = 50;

/// Embedding-backed similarity search over the vector-extended policy store.
pub struct VectorSearchClient {
    pool: PgPool,
    gateway: Arc<Gateway>,
    cache: Mutex<EmbeddingCache>,
    embedding_dimensions: usize,
}

impl VectorSearchClient {
    /// Builds a client from a connected pool, the shared LLM gateway, and
    /// the configured cache size/embedding dimension.
    #[must_use]
    pub fn new(
        pool: PgPool,
        gateway: Arc<Gateway>,
        cache_size: usize,
        embedding_dimensions: usize,
    ) -> Self {
        Self {
            pool,
            gateway,
            cache: Mutex::new(EmbeddingCache::new(cache_size)),
            embedding_dimensions,
        }
    }

    /// Runs a similarity search against `table`, returning up to `top_k`
    /// matches ordered by descending `similarity_score`, each tagged with
    /// `table`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::EmptyQuery`] or [`VectorError::TopKOutOfRange`]
    /// on invalid input, or the underlying embedding/store error otherwise.
    pub async fn search(
        &self,
        table: VectorTable,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(VectorError::EmptyQuery);
        }
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(VectorError::TopKOutOfRange(top_k));
        }

        let embedding = self.embed_cached(trimmed).await?;
        self.search_by_embedding(table, &embedding, top_k).await
    }

    async fn embed_cached(&self, query: &str) -> Result<Vec<f32>, VectorError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(query) {
                return Ok(cached);
            }
        }

        let embeddings = self
            .gateway
            .embed(&[query.to_owned()], self.embedding_dimensions)
            .await?;
        let embedding = embeddings.into_iter().next().unwrap_or_default();

        let mut cache = self.cache.lock().await;
        cache.put(query.to_owned(), embedding.clone());
        Ok(embedding)
    }

    async fn search_by_embedding(
        &self,
        table: VectorTable,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, VectorError> {
        let procedure = table.procedure_name();
        let top_k_i64 = i64::try_from(top_k).unwrap_or(i64::from(i32::MAX));

        let rows: Vec<(String, String, f64, serde_json::Value)> = sqlx::query_as(&format!(
            "SELECT id, content, similarity_score, metadata FROM {procedure}($1, $2)"
        ))
        .bind(embedding)
        .bind(top_k_i64)
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<VectorMatch> = rows
            .into_iter()
            .map(|(id, content, similarity_score, metadata)| VectorMatch {
                id,
                table: table.as_str().to_owned(),
                content,
                similarity_score,
                metadata,
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedure_names_match_table_convention() {
        assert_eq!(
            VectorTable::GeneralConditions.procedure_name(),
            "search_general_conditions_vector"
        );
        assert_eq!(VectorTable::Benefits.procedure_name(), "search_benefits_vector");
        assert_eq!(
            VectorTable::BenefitConditions.procedure_name(),
            "search_benefit_conditions_vector"
        );
    }

    #[test]
    fn parses_routing_table_names() {
        assert_eq!(
            VectorTable::parse("general_conditions"),
            Some(VectorTable::GeneralConditions)
        );
        assert_eq!(VectorTable::parse("unknown_table"), None);
    }
}
