//! Shared turn state: the typed container that flows through the turn graph.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::agents::methodologist::MethodologistOutput;
use crate::agents::observer::ObserverInsight;
use crate::agents::structurer::StructurerOutput;
use crate::error::{EngineError, EngineResult};
use crate::llm::{ChatMessage, Role};
use crate::model::{CognitiveModel, FocalArgument};

/// Conversation stage at the end of a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The orchestrator is still classifying what the user wants.
    #[default]
    Classifying,
    /// The structurer is organizing the observation into a question.
    Structuring,
    /// The methodologist is validating scientific rigor.
    Validating,
    /// The hypothesis was approved.
    Completed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Classifying => write!(f, "classifying"),
            Stage::Structuring => write!(f, "structuring"),
            Stage::Validating => write!(f, "validating"),
            Stage::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classifying" => Ok(Stage::Classifying),
            "structuring" => Ok(Stage::Structuring),
            "validating" => Ok(Stage::Validating),
            "completed" => Ok(Stage::Completed),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// The orchestrator's routing decision for the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Keep exploring the topic conversationally.
    Explore,
    /// Hand the turn to a specialized agent.
    SuggestAgent,
    /// Ask the user to clarify or re-align.
    Clarify,
}

impl std::fmt::Display for NextStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextStep::Explore => write!(f, "explore"),
            NextStep::SuggestAgent => write!(f, "suggest_agent"),
            NextStep::Clarify => write!(f, "clarify"),
        }
    }
}

impl std::str::FromStr for NextStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explore" => Ok(NextStep::Explore),
            "suggest_agent" => Ok(NextStep::SuggestAgent),
            "clarify" => Ok(NextStep::Clarify),
            _ => Err(format!("Unknown next step: {}", s)),
        }
    }
}

/// Agents the orchestrator can hand a turn to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Structurer,
    Methodologist,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Structurer => write!(f, "structurer"),
            AgentKind::Methodologist => write!(f, "methodologist"),
        }
    }
}

/// A hand-off suggestion produced by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSuggestion {
    pub agent: AgentKind,
    pub justification: String,
}

/// Shared slot the background observer writes into by reference.
///
/// The orchestrator spawns the observer on a background task and hands it a
/// clone of this cell; whatever is present when the turn commits is what the
/// checkpoint records.
#[derive(Debug, Clone, Default)]
pub struct ObserverCell(Arc<Mutex<Option<ObserverInsight>>>);

impl ObserverCell {
    /// Store the observer's insight
    pub fn set(&self, insight: ObserverInsight) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(insight);
    }

    /// Snapshot whatever is present right now
    pub fn get(&self) -> Option<ObserverInsight> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Serialize for ObserverCell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObserverCell {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let inner = Option::<ObserverInsight>::deserialize(deserializer)?;
        Ok(ObserverCell(Arc::new(Mutex::new(inner))))
    }
}

/// The typed container that flows between agents during a turn.
///
/// Created per incoming user message, mutated only by agent nodes, committed
/// to the checkpoint store at turn end keyed by thread id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnState {
    /// Text of the current user message
    pub user_input: String,
    pub session_id: String,
    /// 1-based turn counter within the thread
    pub turn_count: u32,
    /// Full chronological conversation, user and assistant roles only
    pub messages: Vec<ChatMessage>,
    pub current_stage: Stage,
    /// The orchestrator's reasoning text for this turn
    pub orchestrator_analysis: Option<String>,
    /// Never `None` after the orchestrator has run
    pub next_step: Option<NextStep>,
    pub agent_suggestion: Option<AgentSuggestion>,
    pub focal_argument: FocalArgument,
    pub cognitive_model: CognitiveModel,
    pub structurer_output: Option<StructurerOutput>,
    pub methodologist_output: Option<MethodologistOutput>,
    /// Telemetry for the most recent node; zero for nodes without LLM calls
    pub last_agent_tokens_input: u32,
    pub last_agent_tokens_output: u32,
    pub last_agent_cost: f64,
    /// External idea this conversation is bound to
    pub idea_id: Option<String>,
    /// Turn of the last user-facing checkpoint, drives the cooldown filter
    pub last_checkpoint_turn: Option<u32>,
    /// Background observer write-back slot
    #[serde(default)]
    pub observer: ObserverCell,
}

impl TurnState {
    /// Build the invariant-correct initial state for a new user message:
    /// exactly one trailing user message whose content equals `user_input`.
    pub fn for_message(session_id: impl Into<String>, user_input: impl Into<String>) -> Self {
        let user_input = user_input.into();
        Self {
            messages: vec![ChatMessage::user(user_input.clone())],
            user_input,
            session_id: session_id.into(),
            turn_count: 1,
            current_stage: Stage::Classifying,
            orchestrator_analysis: None,
            next_step: None,
            agent_suggestion: None,
            focal_argument: FocalArgument::default(),
            cognitive_model: CognitiveModel::default(),
            structurer_output: None,
            methodologist_output: None,
            last_agent_tokens_input: 0,
            last_agent_tokens_output: 0,
            last_agent_cost: 0.0,
            idea_id: None,
            last_checkpoint_turn: None,
            observer: ObserverCell::default(),
        }
    }

    /// Same as [`TurnState::for_message`] with a fresh session id
    pub fn for_new_session(user_input: impl Into<String>) -> Self {
        Self::for_message(Uuid::new_v4().to_string(), user_input)
    }

    /// Check the new-message invariant before a turn starts
    pub fn validate_initial(&self) -> EngineResult<()> {
        let last = self.messages.last().ok_or_else(|| EngineError::State {
            message: "initial state has no messages".to_string(),
        })?;

        if last.role != Role::User || last.content != self.user_input {
            return Err(EngineError::State {
                message: "initial state must end with a user message equal to user_input"
                    .to_string(),
            });
        }

        let trailing_users = self
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role == Role::User)
            .count();
        if trailing_users != 1 {
            return Err(EngineError::State {
                message: format!(
                    "initial state must have exactly one trailing user message, found {}",
                    trailing_users
                ),
            });
        }

        Ok(())
    }

    /// Re-hydrate conversation history from a prior checkpoint: prior
    /// messages come first, the turn counter advances and the cognitive
    /// model carries over.
    pub fn merge_prior(&mut self, prior: TurnState) {
        let mut messages = prior.messages;
        messages.append(&mut self.messages);
        self.messages = messages;

        self.session_id = prior.session_id;
        self.turn_count = prior.turn_count + 1;
        self.current_stage = prior.current_stage;
        self.focal_argument = prior.focal_argument;
        self.cognitive_model = prior.cognitive_model;
        self.last_checkpoint_turn = prior.last_checkpoint_turn;
        if self.idea_id.is_none() {
            self.idea_id = prior.idea_id;
        }
    }

    /// Turns elapsed since the last user-facing checkpoint.
    /// `u32::MAX` when none has happened, so cooldown never suppresses the
    /// first confirmed direction change.
    pub fn turns_since_last_checkpoint(&self) -> u32 {
        match self.last_checkpoint_turn {
            Some(turn) => self.turn_count.saturating_sub(turn),
            None => u32::MAX,
        }
    }

    /// Zero the per-node telemetry fields. The instrumentation wrapper calls
    /// this before each node so agents without LLM calls report zeros.
    pub fn reset_telemetry(&mut self) {
        self.last_agent_tokens_input = 0;
        self.last_agent_tokens_output = 0;
        self.last_agent_cost = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_message_satisfies_initial_invariant() {
        let state = TurnState::for_message("sess-1", "LLMs aumentam produtividade");
        assert!(state.validate_initial().is_ok());
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.turn_count, 1);
        assert_eq!(state.current_stage, Stage::Classifying);
    }

    #[test]
    fn test_validate_rejects_trailing_assistant() {
        let mut state = TurnState::for_message("sess-1", "oi");
        state.messages.push(ChatMessage::assistant("olá"));
        assert!(state.validate_initial().is_err());
    }

    #[test]
    fn test_validate_rejects_double_user_tail() {
        let mut state = TurnState::for_message("sess-1", "oi");
        state.messages.insert(0, ChatMessage::user("antes"));
        assert!(state.validate_initial().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_content() {
        let mut state = TurnState::for_message("sess-1", "oi");
        state.user_input = "outra coisa".to_string();
        assert!(state.validate_initial().is_err());
    }

    #[test]
    fn test_merge_prior_preserves_order_and_advances_turn() {
        let mut prior = TurnState::for_message("sess-1", "primeira mensagem");
        prior.messages.push(ChatMessage::assistant("resposta 1"));
        prior.cognitive_model.claim = "LLMs aumentam produtividade".to_string();
        prior.last_checkpoint_turn = Some(1);

        let mut state = TurnState::for_message("ignored", "segunda mensagem");
        state.merge_prior(prior);

        assert_eq!(state.session_id, "sess-1");
        assert_eq!(state.turn_count, 2);
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].content, "primeira mensagem");
        assert_eq!(state.messages[2].content, "segunda mensagem");
        assert_eq!(state.cognitive_model.claim, "LLMs aumentam produtividade");
        assert_eq!(state.last_checkpoint_turn, Some(1));
        assert!(state.validate_initial().is_ok());
    }

    #[test]
    fn test_turns_since_last_checkpoint() {
        let mut state = TurnState::for_message("s", "oi");
        state.turn_count = 5;
        assert_eq!(state.turns_since_last_checkpoint(), u32::MAX);

        state.last_checkpoint_turn = Some(3);
        assert_eq!(state.turns_since_last_checkpoint(), 2);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = TurnState::for_message("sess-1", "oi");
        state.next_step = Some(NextStep::Explore);
        state.agent_suggestion = Some(AgentSuggestion {
            agent: AgentKind::Structurer,
            justification: "entrada vaga".to_string(),
        });

        let json = serde_json::to_string(&state).unwrap();
        let back: TurnState = serde_json::from_str(&json).unwrap();

        assert_eq!(back.session_id, "sess-1");
        assert_eq!(back.next_step, Some(NextStep::Explore));
        assert_eq!(
            back.agent_suggestion.as_ref().unwrap().agent,
            AgentKind::Structurer
        );
        assert!(back.observer.get().is_none());
    }

    #[test]
    fn test_next_step_serialization_names() {
        assert_eq!(
            serde_json::to_string(&NextStep::SuggestAgent).unwrap(),
            "\"suggest_agent\""
        );
        assert_eq!("explore".parse::<NextStep>().unwrap(), NextStep::Explore);
    }
}
