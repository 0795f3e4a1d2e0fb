use serde::{Deserialize, Serialize};

/// Message in an LLM conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Response from a provider completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Completion text. Agents expect a parseable JSON document here.
    pub content: String,
    pub usage: UsageMetadata,
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl LlmResponse {
    /// Build a response with explicit usage numbers
    pub fn new(content: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            content: content.into(),
            usage: UsageMetadata {
                input_tokens,
                output_tokens,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::system("regras");
        assert_eq!(msg.role, Role::System);

        let msg = ChatMessage::user("oi");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "oi");

        let msg = ChatMessage::assistant("olá");
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
