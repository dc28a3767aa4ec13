//! Anthropic `/v1/messages` provider.

use serde_json::{json, Value};

use super::{
    check_http_response, CompletionRequest, CompletionResponse, LlmProvider, ProviderError, Role,
    UsageStats,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

fn anthropic_role(role: Role) -> &'static str {
    match role {
        Role::System | Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Anthropic has no first-class "system" message slot in the chat array —
/// system content is concatenated and sent via the top-level `system` field.
fn split_system_and_turns(messages: &[super::Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        if message.role == Role::System {
            system_parts.push(message.content.clone());
        } else {
            turns.push(json!({
                "role": anthropic_role(message.role),
                "content": message.content,
            }));
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, turns)
}

fn parse_content_text(value: &Value) -> Result<String, ProviderError> {
    let Some(items) = value.get("content").and_then(Value::as_array) else {
        return Err(ProviderError::Parse("missing content array".to_owned()));
    };

    let mut text = String::new();
    for item in items {
        if item.get("type").and_then(Value::as_str) == Some("text") {
            text.push_str(item.get("text").and_then(Value::as_str).unwrap_or_default());
        }
    }
    Ok(text)
}

fn parse_usage(value: &Value) -> UsageStats {
    let Some(usage) = value.get("usage") else {
        return UsageStats::default();
    };
    UsageStats {
        input_tokens: usage
            .get("input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        output_tokens: usage
            .get("output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    }
}

/// Anthropic messages API provider.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
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
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if request.messages.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "completion request has no messages".to_owned(),
            ));
        }

        let (system, turns) = split_system_and_turns(&request.messages);

        let mut body = json!({
            "model": request.model,
            "messages": turns,
            "max_tokens": if request.max_tokens == 0 { DEFAULT_MAX_TOKENS } else { request.max_tokens },
            "temperature": request.temperature,
        });

        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        let parsed: Value =
            serde_json::from_str(&payload).map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(CompletionResponse {
            content: parse_content_text(&parsed)?,
            usage: parse_usage(&parsed),
            model: parsed
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_owned(),
        })
    }

    async fn embed(
        &self,
        _model: &str,
        _texts: &[String],
        _dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Unavailable(
            "anthropic does not expose an embeddings endpoint".to_owned(),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn splits_system_messages_from_turns() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("classify this"),
        ];
        let (system, turns) = split_system_and_turns(&messages);
        assert_eq!(system, Some("be terse".to_owned()));
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn parses_text_content_blocks() {
        let body = json!({
            "content": [{"type": "text", "text": "hello"}],
            "usage": {"input_tokens": 3, "output_tokens": 1},
        });
        assert_eq!(parse_content_text(&body).unwrap(), "hello");
        assert_eq!(parse_usage(&body).input_tokens, 3);
    }

    #[tokio::test]
    async fn embed_is_unavailable() {
        let provider =
            AnthropicProvider::new("key".to_owned(), "https://api.anthropic.com/v1".to_owned());
        let result = provider.embed("claude-3", &[], 0).await;
        assert!(result.is_err());
    }
}
