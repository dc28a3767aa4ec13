//! Memory Service (C11): thin client for the managed conversational-memory
//! provider. Multi-tenant by `user_id`; every call is scoped to one tenant
//! so a caller can never read or delete across users by construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backoff::jittered_backoff;
use crate::error::{SurfaceKind, ToSurface};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// A single conversation turn submitted to [`MemoryClient::add`].
#[derive(Debug, Clone, Serialize)]
pub struct MemoryMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// A stored or retrieved memory entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryEntry {
    /// Provider-assigned memory id.
    pub id: String,
    /// The extracted/stored memory text.
    pub memory: String,
    /// Relevance score, present on search results.
    #[serde(default)]
    pub score: Option<f64>,
    /// Caller-supplied metadata, echoed back.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// One outcome of an [`MemoryClient::add`] call.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryWriteResult {
    /// Provider-assigned memory id.
    pub id: String,
    /// The extracted/stored memory text.
    pub memory: String,
    /// What the provider did with this memory (`"ADD"`, `"UPDATE"`, `"DELETE"`).
    pub event: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    results: Vec<MemoryWriteResult>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Wrapped { results: Vec<MemoryEntry> },
    Bare(Vec<MemoryEntry>),
}

impl ListResponse {
    fn into_entries(self) -> Vec<MemoryEntry> {
        match self {
            Self::Wrapped { results } => results,
            Self::Bare(entries) => entries,
        }
    }
}

#[derive(Debug, Serialize)]
struct Filters<'a> {
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    messages: &'a [MemoryMessage],
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    filters: Filters<'a>,
    limit: u32,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    filters: Filters<'a>,
}

/// Errors from the memory provider client.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// `user_id` was empty.
    #[error("user_id must not be empty")]
    EmptyUserId,
    /// `messages` was empty.
    #[error("messages must not be empty")]
    EmptyMessages,
    /// The provider request failed on every retry attempt.
    #[error("memory provider request failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Attempts made before giving up.
        attempts: u32,
        /// The final transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The provider responded with a non-success status.
    #[error("memory provider returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl ToSurface for MemoryError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::EmptyUserId | Self::EmptyMessages => SurfaceKind::InvalidArgument,
            Self::Exhausted { .. } | Self::HttpStatus { .. } => SurfaceKind::Unavailable,
        }
    }
}

/// Client for the managed conversational-memory provider's cloud API.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl MemoryClient {
    /// Builds a client pointed at `base_url`, authenticating with `api_key`
    /// via a `Token` authorization header, with a 30-second request timeout.
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            api_key,
            client,
        }
    }

    /// Extracts and stores memories from a conversation turn.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyUserId`] or [`MemoryError::EmptyMessages`]
    /// on invalid input, or a request/status error otherwise.
    pub async fn add(
        &self,
        user_id: &str,
        messages: &[MemoryMessage],
        metadata: Option<&Value>,
    ) -> Result<Vec<MemoryWriteResult>, MemoryError> {
        if user_id.trim().is_empty() {
            return Err(MemoryError::EmptyUserId);
        }
        if messages.is_empty() {
            return Err(MemoryError::EmptyMessages);
        }

        let body = AddRequest {
            messages,
            user_id,
            metadata,
        };
        let response: AddResponse = self.post_with_retry("/v1/memories/", &body).await?;
        Ok(response.results)
    }

    /// Searches `user_id`'s memories by semantic similarity to `query`,
    /// returning at most `limit` entries (default 10 when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyUserId`] on invalid input, or a
    /// request/status error otherwise.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<u32>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        if user_id.trim().is_empty() {
            return Err(MemoryError::EmptyUserId);
        }

        let body = SearchRequest {
            query,
            filters: Filters { user_id },
            limit: limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        };
        let response: ListResponse = self.post_with_retry("/v2/memories/search/", &body).await?;
        Ok(response.into_entries())
    }

    /// Returns every stored memory for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyUserId`] on invalid input, or a
    /// request/status error otherwise.
    pub async fn all(&self, user_id: &str) -> Result<Vec<MemoryEntry>, MemoryError> {
        if user_id.trim().is_empty() {
            return Err(MemoryError::EmptyUserId);
        }

        let body = ListRequest {
            filters: Filters { user_id },
        };
        let response: ListResponse = self.post_with_retry("/v2/memories/", &body).await?;
        Ok(response.into_entries())
    }

    /// Deletes a single memory by id.
    ///
    /// # Errors
    ///
    /// Returns a request/status error if the provider rejects the call.
    pub async fn delete(&self, memory_id: &str) -> Result<(), MemoryError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self
                .client
                .delete(format!("{}/v1/memories/{memory_id}/", self.base_url))
                .header("Authorization", format!("Token {}", self.api_key))
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(MemoryError::HttpStatus {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(_) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(jittered_backoff(attempt)).await;
                }
                Err(source) => {
                    return Err(MemoryError::Exhausted {
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }

    async fn post_with_retry<B, R>(&self, path: &str, body: &B) -> Result<R, MemoryError>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self
                .client
                .post(format!("{}{path}", self.base_url))
                .header("Authorization", format!("Token {}", self.api_key))
                .json(body)
                .send()
                .await;

            let response = match outcome {
                Ok(response) => response,
                Err(_) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(jittered_backoff(attempt)).await;
                    continue;
                }
                Err(source) => {
                    return Err(MemoryError::Exhausted {
                        attempts: attempt,
                        source,
                    })
                }
            };

            let status = response.status();
            if status.is_server_error() && attempt < MAX_ATTEMPTS {
                tokio::time::sleep(jittered_backoff(attempt)).await;
                continue;
            }

            let text = response.text().await.map_err(|source| MemoryError::Exhausted {
                attempts: attempt,
                source,
            })?;
            if !status.is_success() {
                return Err(MemoryError::HttpStatus {
                    status: status.as_u16(),
                    body: text,
                });
            }

            return serde_json::from_str(&text).map_err(|e| MemoryError::HttpStatus {
                status: status.as_u16(),
                body: format!("failed to parse memory provider response: {e}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_user_id_on_add() {
        let client = MemoryClient::new("http://localhost:9999".to_owned(), "key".to_owned());
        let err = client.add("", &[], None).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyUserId));
    }

    #[tokio::test]
    async fn rejects_empty_messages_on_add() {
        let client = MemoryClient::new("http://localhost:9999".to_owned(), "key".to_owned());
        let err = client.add("alice", &[], None).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyMessages));
    }

    #[tokio::test]
    async fn rejects_empty_user_id_on_search() {
        let client = MemoryClient::new("http://localhost:9999".to_owned(), "key".to_owned());
        let err = client.search("", "query", None).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyUserId));
    }

    #[test]
    fn list_response_accepts_wrapped_and_bare_shapes() {
        let wrapped: ListResponse =
            serde_json::from_str(r#"{"results":[{"id":"1","memory":"likes window seats"}]}"#).unwrap();
        assert_eq!(wrapped.into_entries().len(), 1);

        let bare: ListResponse =
            serde_json::from_str(r#"[{"id":"1","memory":"likes window seats"}]"#).unwrap();
        assert_eq!(bare.into_entries().len(), 1);
    }
}
