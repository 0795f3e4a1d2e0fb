//! Structurer agent: organizes a vague observation into a structured
//! research question.
//!
//! Collaborative by contract: it never rejects. When the LLM output violates
//! the question invariants (must contain `?`, must differ from the user's
//! input) the agent repairs it locally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::AgentConfig;
use super::context::assemble_context;
use super::extract_json;
use crate::error::EngineResult;
use crate::llm::{ChatMessage, LlmService};
use crate::state::{Stage, TurnState};

/// Decomposed elements of the structured question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredElements {
    #[serde(default = "unspecified")]
    pub context: String,
    #[serde(default = "unspecified")]
    pub problem: String,
    #[serde(default = "unspecified")]
    pub contribution: String,
}

fn unspecified() -> String {
    "não especificado".to_string()
}

impl Default for StructuredElements {
    fn default() -> Self {
        Self {
            context: unspecified(),
            problem: unspecified(),
            contribution: unspecified(),
        }
    }
}

/// Structurer output attached to the turn state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructurerOutput {
    pub structured_question: String,
    #[serde(default)]
    pub elements: StructuredElements,
}

/// The structurer agent
pub struct StructurerAgent {
    llm: Arc<LlmService>,
    config: AgentConfig,
}

impl StructurerAgent {
    /// Create a new structurer
    pub fn new(llm: Arc<LlmService>, config: AgentConfig) -> Self {
        Self { llm, config }
    }

    /// Run the structurer node for one turn
    pub async fn run(&self, state: &mut TurnState) -> EngineResult<()> {
        let messages = vec![
            ChatMessage::system(&self.config.prompt),
            ChatMessage::user(assemble_context(&state.user_input, &state.messages)),
        ];

        let outcome = self
            .llm
            .invoke(&self.config.model, &messages, &self.config.name)
            .await?;

        state.last_agent_tokens_input = outcome.tokens_input;
        state.last_agent_tokens_output = outcome.tokens_output;
        state.last_agent_cost = outcome.cost;

        let output = parse_structurer_output(&outcome.response.content, &state.user_input);

        debug!(
            session_id = %state.session_id,
            question = %output.structured_question,
            "Structured question produced"
        );

        state.structurer_output = Some(output);
        state.current_stage = Stage::Validating;
        Ok(())
    }
}

/// Parse the LLM output and enforce the question invariants
pub fn parse_structurer_output(content: &str, user_input: &str) -> StructurerOutput {
    let value = extract_json(content);

    let question = value
        .as_ref()
        .and_then(|v| v.get("structured_question"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let elements = value
        .as_ref()
        .and_then(|v| v.get("elements"))
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    StructurerOutput {
        structured_question: ensure_question(question, user_input),
        elements,
    }
}

/// Best-effort repair: the result always contains a question mark and
/// always differs from the raw input.
fn ensure_question(question: Option<String>, user_input: &str) -> String {
    let input = user_input.trim();
    let mut question = question.map(|q| q.trim().to_string()).unwrap_or_default();

    if question.is_empty() || question == input {
        let condensed: String = input.chars().take(120).collect();
        question = format!(
            "De que forma \"{}\" pode ser investigado de maneira sistemática?",
            condensed.trim_end_matches(['?', '.', '!'])
        );
    }

    if !question.contains('?') {
        question.push('?');
    }

    question
}
