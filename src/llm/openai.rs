//! OpenAI-compatible provider: `/chat/completions` and `/embeddings`.

use serde::{Deserialize, Serialize};

use super::{
    check_http_response, CompletionRequest, CompletionResponse, LlmProvider, ProviderError, Role,
    UsageStats,
};

const DEFAULT_MAX_TOKENS: u32 = 4096;

#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAiResponseFormat>,
}

#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: String,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponse {
    pub choices: Vec<OpenAiChoice>,
    pub model: String,
    pub usage: Option<OpenAiUsage>,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponseMessage {
    pub content: Option<String>,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiEmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
    pub dimensions: usize,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiEmbeddingResponse {
    pub data: Vec<OpenAiEmbeddingItem>,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiEmbeddingItem {
    pub embedding: Vec<f32>,
    pub index: usize,
}

fn role_to_openai(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Build an OpenAI chat-completions request body.
#[doc(hidden)]
pub fn build_request(request: &CompletionRequest) -> OpenAiRequest {
    OpenAiRequest {
        model: request.model.clone(),
        messages: request
            .messages
            .iter()
            .map(|m| OpenAiMessage {
                role: role_to_openai(m.role).to_owned(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: request.temperature,
        max_tokens: if request.max_tokens == 0 {
            DEFAULT_MAX_TOKENS
        } else {
            request.max_tokens
        },
        response_format: request.json_mode.then_some(OpenAiResponseFormat {
            kind: "json_object",
        }),
    }
}

/// Parse an OpenAI chat-completions response body.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the body does not deserialize or has no choices.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let resp: OpenAiResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("missing choices[0]".to_owned()))?;

    let usage = UsageStats {
        input_tokens: resp
            .usage
            .as_ref()
            .and_then(|u| u.prompt_tokens)
            .unwrap_or(0),
        output_tokens: resp
            .usage
            .as_ref()
            .and_then(|u| u.completion_tokens)
            .unwrap_or(0),
    };

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: resp.model,
    })
}

/// OpenAI-compatible chat + embeddings provider.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new provider instance pointed at `base_url` (no trailing slash).
    #[must_use]
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if request.messages.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "completion request has no messages".to_owned(),
            ));
        }

        let api_request = build_request(&request);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        parse_response(&payload)
    }

    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "embed request has no texts".to_owned(),
            ));
        }

        let body = OpenAiEmbeddingRequest {
            model,
            input: texts,
            dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        let mut parsed: OpenAiEmbeddingResponse =
            serde_json::from_str(&payload).map_err(|e| ProviderError::Parse(e.to_string()))?;

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn builds_json_mode_request() {
        let req = CompletionRequest {
            model: "gpt-4o-mini".to_owned(),
            messages: vec![Message::system("route this")],
            temperature: 0.0,
            max_tokens: 100,
            json_mode: true,
            timeout: None,
        };
        let built = build_request(&req);
        assert_eq!(built.messages.len(), 1);
        assert!(built.response_format.is_some());
    }

    #[test]
    fn parses_well_formed_response() {
        let body = r#"{"choices":[{"message":{"content":"{\"tables\":[\"benefits\"]}"}}],"model":"gpt-4o-mini","usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.content, "{\"tables\":[\"benefits\"]}");
        assert_eq!(resp.usage.input_tokens, 10);
    }

    #[test]
    fn rejects_response_with_no_choices() {
        let body = r#"{"choices":[],"model":"gpt-4o-mini"}"#;
        assert!(parse_response(body).is_err());
    }
}
