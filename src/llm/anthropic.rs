use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::types::{ChatMessage, LlmResponse, Role, UsageMetadata};
use super::LlmProvider;
use crate::error::{LlmError, LlmResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API provider (`claude-*` models)
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(api_key: impl Into<String>, base_url: &str, timeout_ms: u64) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// The Messages API takes the system prompt as a top-level field,
    /// separate from the message list.
    fn build_body(&self, model: &str, messages: &[ChatMessage]) -> serde_json::Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::System => unreachable!(),
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": api_messages,
        });

        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        agent_name: &str,
    ) -> LlmResult<LlmResponse> {
        let url = format!("{}/v1/messages", self.base_url);

        debug!(
            agent = %agent_name,
            model = %model,
            messages = messages.len(),
            "Calling Anthropic Messages API"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&self.build_body(model, messages))
            .send()
            .await
            .map_err(LlmError::Http)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    message: format!("Failed to parse Anthropic response: {}", e),
                })?;

        let content: String = parsed
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect();

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                message: "Anthropic response contained no text blocks".to_string(),
            });
        }

        let usage = parsed.usage.map_or_else(UsageMetadata::default, |u| {
            UsageMetadata {
                input_tokens: u.input_tokens.unwrap_or(0),
                output_tokens: u.output_tokens.unwrap_or(0),
            }
        });

        Ok(LlmResponse { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("test_key", "https://api.anthropic.com", 30_000).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let p = provider();
        assert_eq!(p.name(), "anthropic");
        assert_eq!(p.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn test_system_prompt_is_lifted_out_of_messages() {
        let p = provider();
        let messages = vec![
            ChatMessage::system("Você é um orientador de pesquisa."),
            ChatMessage::user("LLMs aumentam produtividade"),
        ];

        let body = p.build_body("claude-3-5-sonnet-20241022", &messages);

        assert_eq!(body["system"], "Você é um orientador de pesquisa.");
        let api_messages = body["messages"].as_array().unwrap();
        assert_eq!(api_messages.len(), 1);
        assert_eq!(api_messages[0]["role"], "user");
    }

    #[test]
    fn test_body_without_system_prompt() {
        let p = provider();
        let messages = vec![ChatMessage::user("oi")];

        let body = p.build_body("claude-3-5-haiku-20241022", &messages);

        assert!(body.get("system").is_none());
        assert_eq!(body["model"], "claude-3-5-haiku-20241022");
    }
}
