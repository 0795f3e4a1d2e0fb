use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::types::{ChatMessage, LlmResponse, Role, UsageMetadata};
use super::LlmProvider;
use crate::error::{LlmError, LlmResult};

/// Maritaca provider (`sabia*` models), OpenAI-compatible chat completions
#[derive(Clone)]
pub struct MaritacaProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

impl MaritacaProvider {
    /// Create a new Maritaca provider
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

    fn build_body(&self, model: &str, messages: &[ChatMessage]) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": model,
            "messages": api_messages,
            "stream": false,
        })
    }
}

#[async_trait]
impl LlmProvider for MaritacaProvider {
    fn name(&self) -> &'static str {
        "maritaca"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        agent_name: &str,
    ) -> LlmResult<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(
            agent = %agent_name,
            model = %model,
            messages = messages.len(),
            "Calling Maritaca chat completions"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    message: format!("Failed to parse Maritaca response: {}", e),
                })?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Maritaca response contained no choices".to_string(),
            })?;

        let usage = parsed.usage.map_or_else(UsageMetadata::default, |u| {
            UsageMetadata {
                input_tokens: u.prompt_tokens.unwrap_or(0),
                output_tokens: u.completion_tokens.unwrap_or(0),
            }
        });

        Ok(LlmResponse { content, usage })
    }
}
