//! Orchestrator agent: the single primary LLM call of the turn.
//!
//! Produces the assistant's reply, updates the cognitive model, decides the
//! routing and initiates the background observer. Malformed LLM output is
//! recovered locally with a fallback cognitive model; snapshot failures are
//! logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use super::catalog::AgentConfig;
use super::context::assemble_context;
use super::extract_json;
use super::observer::{ObserverAgent, ObserverSnapshot};
use crate::config::{ModelConfig, ObserverConfig};
use crate::error::EngineResult;
use crate::events::{EventBus, EventKind, EventRecord};
use crate::llm::{ChatMessage, LlmService};
use crate::model::{CognitiveModel, FocalArgument};
use crate::state::{AgentSuggestion, NextStep, TurnState};
use crate::storage::{SqliteStorage, Storage};

/// Validated orchestrator LLM reply
#[derive(Debug, Clone)]
pub struct OrchestratorReply {
    pub reasoning: Option<String>,
    pub next_step: NextStep,
    pub message: String,
    pub focal_argument: Option<FocalArgument>,
    pub cognitive_model: CognitiveModel,
    pub agent_suggestion: Option<AgentSuggestion>,
    pub reflection_prompt: Option<String>,
}

/// The orchestrator agent
pub struct OrchestratorAgent {
    llm: Arc<LlmService>,
    config: AgentConfig,
    events: EventBus,
    storage: SqliteStorage,
    observer: ObserverAgent,
    model_config: ModelConfig,
    observer_config: ObserverConfig,
}

impl OrchestratorAgent {
    /// Create a new orchestrator
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<LlmService>,
        config: AgentConfig,
        events: EventBus,
        storage: SqliteStorage,
        observer: ObserverAgent,
        model_config: ModelConfig,
        observer_config: ObserverConfig,
    ) -> Self {
        Self {
            llm,
            config,
            events,
            storage,
            observer,
            model_config,
            observer_config,
        }
    }

    /// Run the orchestrator node for one turn
    pub async fn run(
        &self,
        state: &mut TurnState,
        active_idea_id: Option<&str>,
    ) -> EngineResult<()> {
        // The observer works on the pre-reply conversation, concurrently
        // with the primary call.
        let snapshot = ObserverSnapshot {
            session_id: state.session_id.clone(),
            turn_number: state.turn_count,
            turns_since_last_checkpoint: state.turns_since_last_checkpoint(),
            user_input: state.user_input.clone(),
            prior_focal: state.focal_argument.clone(),
            messages: state.messages.clone(),
        };
        let observer_handle = self.observer.spawn(snapshot, state.observer.clone());

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

        let reply = parse_orchestrator_reply(
            &outcome.response.content,
            &state.user_input,
            self.model_config.contradiction_confidence_threshold,
        );

        state.messages.push(ChatMessage::assistant(&reply.message));
        state.orchestrator_analysis = reply.reasoning;
        state.next_step = Some(reply.next_step);
        state.agent_suggestion = reply.agent_suggestion;
        if let Some(focal) = reply.focal_argument {
            state.focal_argument = focal;
        }
        state.cognitive_model = reply.cognitive_model;

        self.events.publish(
            EventRecord::new(
                EventKind::CognitiveModelUpdated,
                &state.session_id,
                state.turn_count,
            )
            .with_field("claim", json!(state.cognitive_model.claim))
            .with_field(
                "propositions",
                json!(state.cognitive_model.propositions.len()),
            )
            .with_field(
                "open_questions",
                json!(state.cognitive_model.open_questions.len()),
            )
            .with_field("maturity", json!(state.cognitive_model.maturity())),
        )?;

        if let Some(idea_id) = active_idea_id {
            self.snapshot_if_mature(idea_id, &state.cognitive_model).await;
        }

        // Bounded grace period for the observer. Past it the turn proceeds
        // and the insight lands whenever the worker finishes.
        let grace = Duration::from_millis(self.observer_config.grace_ms);
        let _ = tokio::time::timeout(grace, observer_handle).await;

        if let Some(insight) = state.observer.get() {
            if insight.decision.needs_checkpoint {
                debug!(
                    session_id = %state.session_id,
                    turn = state.turn_count,
                    reason = %insight.decision.reason,
                    "Observer checkpoint confirmed, coercing next_step to clarify"
                );
                state.next_step = Some(NextStep::Clarify);
                state.last_checkpoint_turn = Some(state.turn_count);
            }
        }

        Ok(())
    }

    /// Snapshot hook: failures never affect the turn's visible result
    async fn snapshot_if_mature(&self, idea_id: &str, model: &CognitiveModel) {
        match self
            .storage
            .create_snapshot_if_mature(
                idea_id,
                model,
                self.model_config.snapshot_maturity_threshold,
            )
            .await
        {
            Ok(Some(snapshot_id)) => {
                debug!(idea_id = %idea_id, snapshot_id = %snapshot_id, "Idea snapshot created");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(idea_id = %idea_id, error = %e, "Idea snapshot failed; turn unaffected");
            }
        }
    }
}

/// Post-LLM validation.
///
/// Missing or malformed `cognitive_model` falls back to a claim built from
/// the user input; contradictions below the threshold are dropped;
/// `next_step` defaults to clarify.
pub fn parse_orchestrator_reply(
    content: &str,
    user_input: &str,
    contradiction_threshold: f64,
) -> OrchestratorReply {
    let Some(value) = extract_json(content) else {
        // No JSON at all: treat the completion as the conversational reply
        return OrchestratorReply {
            reasoning: None,
            next_step: NextStep::Clarify,
            message: fallback_message(content),
            focal_argument: None,
            cognitive_model: CognitiveModel::fallback(user_input),
            agent_suggestion: None,
            reflection_prompt: None,
        };
    };

    let next_step = value
        .get("next_step")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(NextStep::Clarify);

    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            "Pode me contar um pouco mais sobre o que você observou?".to_string()
        });

    let mut cognitive_model = value
        .get("cognitive_model")
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value::<CognitiveModel>(v.clone()).ok())
        .unwrap_or_else(|| CognitiveModel::fallback(user_input));
    cognitive_model.normalize();
    cognitive_model.retain_confident_contradictions(contradiction_threshold);

    let focal_argument = value
        .get("focal_argument")
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    let agent_suggestion = value
        .get("agent_suggestion")
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value::<AgentSuggestion>(v.clone()).ok());

    OrchestratorReply {
        reasoning: value
            .get("reasoning")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        next_step,
        message,
        focal_argument,
        cognitive_model,
        agent_suggestion,
        reflection_prompt: value
            .get("reflection_prompt")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

fn fallback_message(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        "Pode me contar um pouco mais sobre o que você observou?".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentKind;

    #[test]
    fn test_parse_complete_reply() {
        let content = r#"{
            "reasoning": "entrada vaga, explorar",
            "next_step": "explore",
            "message": "Interessante! Em que contexto você observou isso?",
            "focal_argument": {"subject": "LLMs e produtividade"},
            "cognitive_model": {
                "claim": "LLMs aumentam produtividade",
                "propositions": [{"text": "devs relatam ganho", "solidity": 0.4}],
                "open_questions": ["qual população?"],
                "contradictions": [
                    {"description": "ganho não medido", "confidence": 0.9},
                    {"description": "especulativa", "confidence": 0.5}
                ]
            },
            "agent_suggestion": null,
            "reflection_prompt": null
        }"#;

        let reply = parse_orchestrator_reply(content, "LLMs aumentam produtividade", 0.80);

        assert_eq!(reply.next_step, NextStep::Explore);
        assert_eq!(
            reply.message,
            "Interessante! Em que contexto você observou isso?"
        );
        assert_eq!(reply.cognitive_model.claim, "LLMs aumentam produtividade");
        // Low-confidence contradiction was filtered out
        assert_eq!(reply.cognitive_model.contradictions.len(), 1);
        assert!(reply.cognitive_model.contradictions[0].confidence >= 0.80);
        assert_eq!(
            reply.focal_argument.unwrap().subject,
            "LLMs e produtividade"
        );
        assert!(reply.agent_suggestion.is_none());
    }

    #[test]
    fn test_missing_cognitive_model_falls_back() {
        let content = r#"{
            "next_step": "explore",
            "message": "Conte mais."
        }"#;

        let reply = parse_orchestrator_reply(content, "LLMs aumentam produtividade", 0.80);

        assert_eq!(reply.cognitive_model.claim, "LLMs aumentam produtividade");
        assert!(!reply.cognitive_model.open_questions.is_empty());
        assert!(reply.cognitive_model.contradictions.is_empty());
    }

    #[test]
    fn test_fallback_claim_is_truncated() {
        let long_input = "x".repeat(400);
        let reply = parse_orchestrator_reply("{}", &long_input, 0.80);
        assert_eq!(reply.cognitive_model.claim.chars().count(), 200);
    }

    #[test]
    fn test_missing_next_step_defaults_to_clarify() {
        let content = r#"{"message": "ok", "cognitive_model": {"claim": "c"}}"#;
        let reply = parse_orchestrator_reply(content, "entrada", 0.80);
        assert_eq!(reply.next_step, NextStep::Clarify);
    }

    #[test]
    fn test_invalid_next_step_defaults_to_clarify() {
        let content = r#"{"next_step": "dançar", "message": "ok"}"#;
        let reply = parse_orchestrator_reply(content, "entrada", 0.80);
        assert_eq!(reply.next_step, NextStep::Clarify);
    }

    #[test]
    fn test_non_json_completion_becomes_the_message() {
        let reply = parse_orchestrator_reply(
            "Desculpe, não consegui estruturar a resposta.",
            "entrada",
            0.80,
        );
        assert_eq!(reply.next_step, NextStep::Clarify);
        assert_eq!(reply.message, "Desculpe, não consegui estruturar a resposta.");
        assert_eq!(reply.cognitive_model.claim, "entrada");
    }

    #[test]
    fn test_agent_suggestion_parses() {
        let content = r#"{
            "next_step": "suggest_agent",
            "message": "Vamos estruturar.",
            "agent_suggestion": {"agent": "structurer", "justification": "observação madura"}
        }"#;

        let reply = parse_orchestrator_reply(content, "entrada", 0.80);
        let suggestion = reply.agent_suggestion.unwrap();
        assert_eq!(suggestion.agent, AgentKind::Structurer);
        assert_eq!(reply.next_step, NextStep::SuggestAgent);
    }

    #[test]
    fn test_invalid_agent_suggestion_is_dropped() {
        let content = r#"{
            "next_step": "suggest_agent",
            "message": "ok",
            "agent_suggestion": {"agent": "researcher", "justification": "x"}
        }"#;

        let reply = parse_orchestrator_reply(content, "entrada", 0.80);
        assert!(reply.agent_suggestion.is_none());
    }
}
