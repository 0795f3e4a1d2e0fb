//! LLM invocation layer.
//!
//! Agents never talk to a provider directly: they go through [`LlmService`],
//! which dispatches on the model-name prefix (`claude*` goes to Anthropic,
//! `sabia*` to Maritaca), retries with exponential backoff, applies a
//! per-provider circuit breaker and extracts token usage and cost.

mod anthropic;
mod maritaca;
mod pricing;
mod service;
mod types;

pub use anthropic::AnthropicProvider;
pub use maritaca::MaritacaProvider;
pub use pricing::{cost_usd, display_cost, price_for, ModelPrice};
pub use service::{LlmOutcome, LlmService};
pub use types::{ChatMessage, LlmResponse, Role, UsageMetadata};

use async_trait::async_trait;

use crate::error::LlmResult;

/// A model provider behind the invocation service.
///
/// Implementations perform a single non-streaming completion call.
/// Retry and circuit breaking live in [`LlmService`], not here.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable provider name, used as the circuit-breaker key.
    fn name(&self) -> &'static str;

    /// Perform one completion call. `agent_name` is for logging only.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        agent_name: &str,
    ) -> LlmResult<LlmResponse>;
}
