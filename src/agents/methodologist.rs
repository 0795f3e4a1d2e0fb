//! Methodologist agent: validates the scientific rigor of a hypothesis.
//!
//! Returns one of three verdicts. Before deciding, it may ask up to three
//! clarifying questions through a [`ClarificationChannel`]; the loop is
//! internal and the graph treats the agent as a single node.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::catalog::AgentConfig;
use super::context::assemble_context;
use super::extract_json;
use crate::error::EngineResult;
use crate::llm::{ChatMessage, LlmService};
use crate::state::{Stage, TurnState};

/// Maximum clarifying questions per evaluation
pub const MAX_CLARIFYING_QUESTIONS: u32 = 3;

/// Rigor dimensions an improvement can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RigorAspect {
    #[serde(rename = "população")]
    Population,
    #[serde(rename = "métricas")]
    Metrics,
    #[serde(rename = "variáveis")]
    Variables,
    #[serde(rename = "testabilidade")]
    Testability,
}

/// A gap found in the hypothesis plus how to close it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Improvement {
    pub aspect: RigorAspect,
    pub gap: String,
    pub suggestion: String,
}

/// Methodologist verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodologyStatus {
    /// Testable, falsifiable, specific and operationalizable
    Approved,
    /// Salvageable; `improvements` lists each gap
    NeedsRefinement,
    /// No scientific basis
    Rejected,
}

impl std::fmt::Display for MethodologyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodologyStatus::Approved => write!(f, "approved"),
            MethodologyStatus::NeedsRefinement => write!(f, "needs_refinement"),
            MethodologyStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Methodologist output attached to the turn state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodologistOutput {
    pub status: MethodologyStatus,
    pub justification: String,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    /// Clarifying questions consumed while deciding
    #[serde(default)]
    pub questions_asked: u32,
}

/// Tool-call interface the methodologist uses to reach the user mid-node.
///
/// `None` means the user cannot answer; the agent is told to decide from
/// the context it already has.
#[async_trait]
pub trait ClarificationChannel: Send + Sync {
    /// Ask the user one clarifying question
    async fn ask(&self, question: &str) -> Option<String>;
}

/// Default channel: the user is unreachable (the UI lives outside the core)
pub struct NoClarification;

#[async_trait]
impl ClarificationChannel for NoClarification {
    async fn ask(&self, _question: &str) -> Option<String> {
        None
    }
}

enum LlmAction {
    Ask(String),
    Verdict(MethodologistOutput),
}

/// The methodologist agent
pub struct MethodologistAgent {
    llm: Arc<LlmService>,
    config: AgentConfig,
    channel: Arc<dyn ClarificationChannel>,
}

impl MethodologistAgent {
    /// Create a new methodologist with the default (no-op) channel
    pub fn new(llm: Arc<LlmService>, config: AgentConfig) -> Self {
        Self {
            llm,
            config,
            channel: Arc::new(NoClarification),
        }
    }

    /// Replace the clarification channel
    pub fn with_channel(mut self, channel: Arc<dyn ClarificationChannel>) -> Self {
        self.channel = channel;
        self
    }

    /// Run the methodologist node for one turn
    pub async fn run(&self, state: &mut TurnState) -> EngineResult<()> {
        let hypothesis = state
            .structurer_output
            .as_ref()
            .map(|o| o.structured_question.clone())
            .unwrap_or_else(|| state.user_input.clone());

        let mut messages = vec![
            ChatMessage::system(&self.config.prompt),
            ChatMessage::user(format!(
                "{}\nHIPÓTESE PARA AVALIAR: {}",
                assemble_context(&state.user_input, &state.messages),
                hypothesis
            )),
        ];

        let mut questions_asked = 0u32;
        let mut output = loop {
            let outcome = self
                .llm
                .invoke(&self.config.model, &messages, &self.config.name)
                .await?;

            state.last_agent_tokens_input += outcome.tokens_input;
            state.last_agent_tokens_output += outcome.tokens_output;
            state.last_agent_cost += outcome.cost;

            match parse_llm_action(&outcome.response.content) {
                LlmAction::Ask(question) if questions_asked < MAX_CLARIFYING_QUESTIONS => {
                    questions_asked += 1;
                    messages.push(ChatMessage::assistant(&question));
                    match self.channel.ask(&question).await {
                        Some(answer) => {
                            debug!(question = %question, "Clarifying question answered");
                            messages.push(ChatMessage::user(answer));
                        }
                        None => {
                            messages.push(ChatMessage::user(
                                "O usuário não está disponível; decida com o contexto atual.",
                            ));
                        }
                    }
                }
                LlmAction::Ask(_) => {
                    // Question budget exhausted: force a decision
                    messages.push(ChatMessage::user(
                        "Limite de perguntas atingido; responda agora com o JSON de decisão.",
                    ));
                    let outcome = self
                        .llm
                        .invoke(&self.config.model, &messages, &self.config.name)
                        .await?;
                    state.last_agent_tokens_input += outcome.tokens_input;
                    state.last_agent_tokens_output += outcome.tokens_output;
                    state.last_agent_cost += outcome.cost;

                    break match parse_llm_action(&outcome.response.content) {
                        LlmAction::Verdict(output) => output,
                        LlmAction::Ask(_) => fallback_verdict(&outcome.response.content),
                    };
                }
                LlmAction::Verdict(output) => break output,
            }
        };

        output.questions_asked = questions_asked;
        normalize_verdict(&mut output);

        debug!(
            session_id = %state.session_id,
            status = %output.status,
            improvements = output.improvements.len(),
            questions_asked,
            "Methodology verdict reached"
        );

        state.current_stage = match output.status {
            MethodologyStatus::Approved => Stage::Completed,
            _ => Stage::Validating,
        };
        state.methodologist_output = Some(output);
        Ok(())
    }
}

fn parse_llm_action(content: &str) -> LlmAction {
    let Some(value) = extract_json(content) else {
        return LlmAction::Verdict(fallback_verdict(content));
    };

    if value.get("action").and_then(|v| v.as_str()) == Some("perguntar") {
        if let Some(question) = value.get("question").and_then(|v| v.as_str()) {
            return LlmAction::Ask(question.to_string());
        }
    }

    let status = value
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(|s| match s {
            "approved" => Some(MethodologyStatus::Approved),
            "needs_refinement" => Some(MethodologyStatus::NeedsRefinement),
            "rejected" => Some(MethodologyStatus::Rejected),
            _ => None,
        })
        .unwrap_or(MethodologyStatus::NeedsRefinement);

    let justification = value
        .get("justification")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let improvements = value
        .get("improvements")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item: &Value| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    LlmAction::Verdict(MethodologistOutput {
        status,
        justification,
        improvements,
        questions_asked: 0,
    })
}

/// Malformed output degrades to a refinement request, never a rejection
fn fallback_verdict(content: &str) -> MethodologistOutput {
    MethodologistOutput {
        status: MethodologyStatus::NeedsRefinement,
        justification: content.trim().to_string(),
        improvements: Vec::new(),
        questions_asked: 0,
    }
}

/// Only `needs_refinement` carries improvements
fn normalize_verdict(output: &mut MethodologistOutput) {
    if output.status != MethodologyStatus::NeedsRefinement {
        output.improvements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_verdict(content: &str) -> MethodologistOutput {
        match parse_llm_action(content) {
            LlmAction::Verdict(mut output) => {
                normalize_verdict(&mut output);
                output
            }
            LlmAction::Ask(_) => panic!("expected verdict"),
        }
    }

    #[test]
    fn test_parse_approved() {
        let output = parse_verdict(
            r#"{"status": "approved", "justification": "testável e operacionalizada", "improvements": []}"#,
        );
        assert_eq!(output.status, MethodologyStatus::Approved);
        assert!(output.improvements.is_empty());
    }

    #[test]
    fn test_parse_needs_refinement_with_improvements() {
        let output = parse_verdict(
            r#"{
                "status": "needs_refinement",
                "justification": "faltam população e métricas",
                "improvements": [
                    {"aspect": "população", "gap": "equipes indefinidas", "suggestion": "delimitar tamanho de equipe"},
                    {"aspect": "métricas", "gap": "produtividade sem medida", "suggestion": "definir métrica objetiva"}
                ]
            }"#,
        );

        assert_eq!(output.status, MethodologyStatus::NeedsRefinement);
        assert_eq!(output.improvements.len(), 2);
        assert_eq!(output.improvements[0].aspect, RigorAspect::Population);
        assert_eq!(output.improvements[1].aspect, RigorAspect::Metrics);
    }

    #[test]
    fn test_approved_never_carries_improvements() {
        let output = parse_verdict(
            r#"{
                "status": "approved",
                "justification": "ok",
                "improvements": [{"aspect": "métricas", "gap": "x", "suggestion": "y"}]
            }"#,
        );
        assert!(output.improvements.is_empty());
    }

    #[test]
    fn test_rejected_never_carries_improvements() {
        let output = parse_verdict(
            r#"{
                "status": "rejected",
                "justification": "sem base científica",
                "improvements": [{"aspect": "testabilidade", "gap": "x", "suggestion": "y"}]
            }"#,
        );
        assert_eq!(output.status, MethodologyStatus::Rejected);
        assert!(output.improvements.is_empty());
    }

    #[test]
    fn test_invalid_improvement_aspect_is_skipped() {
        let output = parse_verdict(
            r#"{
                "status": "needs_refinement",
                "justification": "x",
                "improvements": [
                    {"aspect": "orçamento", "gap": "a", "suggestion": "b"},
                    {"aspect": "variáveis", "gap": "c", "suggestion": "d"}
                ]
            }"#,
        );
        assert_eq!(output.improvements.len(), 1);
        assert_eq!(output.improvements[0].aspect, RigorAspect::Variables);
    }

    #[test]
    fn test_ask_action_is_recognized() {
        let action = parse_llm_action(
            r#"{"action": "perguntar", "question": "Qual o tamanho das equipes?"}"#,
        );
        assert!(matches!(action, LlmAction::Ask(q) if q.contains("equipes")));
    }

    #[test]
    fn test_malformed_output_degrades_to_refinement() {
        let output = parse_verdict("não sei avaliar isso");
        assert_eq!(output.status, MethodologyStatus::NeedsRefinement);
        assert!(output.improvements.is_empty());
    }

    #[test]
    fn test_aspect_serialization_uses_portuguese_names() {
        assert_eq!(
            serde_json::to_string(&RigorAspect::Population).unwrap(),
            "\"população\""
        );
        assert_eq!(
            serde_json::to_string(&RigorAspect::Testability).unwrap(),
            "\"testabilidade\""
        );
    }
}
