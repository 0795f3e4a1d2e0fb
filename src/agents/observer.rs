//! Observer agent: two-layer change detection.
//!
//! Layer 1 asks the LLM whether the latest turn is a variation of the same
//! concept or a real direction change, and scores clarity. Layer 2 (the
//! deterministic filters in [`super::filters`]) decides whether the
//! checkpoint signal survives.
//!
//! The observer never blocks the turn: it runs on a background task spawned
//! by the orchestrator node and writes its insight into the shared
//! [`ObserverCell`](crate::state::ObserverCell). Any failure is logged and
//! suppressed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::catalog::AgentConfig;
use super::context::assemble_context;
use super::extract_json;
use super::filters::{apply_filters, FilterDecision};
use crate::config::ObserverConfig;
use crate::error::EngineResult;
use crate::events::{EventBus, EventKind, EventRecord};
use crate::llm::{ChatMessage, LlmService};
use crate::model::FocalArgument;
use crate::state::ObserverCell;

/// Clarity level tag paired with the 1-5 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClarityLevel {
    Confusa,
    Nebulosa,
    Clara,
    Cristalina,
}

impl ClarityLevel {
    /// Deterministic mapping used when the LLM omits the tag
    pub fn from_score(score: i32) -> Self {
        match score {
            i32::MIN..=2 => ClarityLevel::Confusa,
            3 => ClarityLevel::Nebulosa,
            4 => ClarityLevel::Clara,
            _ => ClarityLevel::Cristalina,
        }
    }
}

/// How the latest turn relates to the previous focus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// Same central concept, refined or detailed
    #[default]
    Variation,
    /// The user moved to a new subject
    RealChange,
}

/// Layer-1 clarity block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarityEvaluation {
    #[serde(default)]
    pub needs_checkpoint: bool,
    #[serde(default = "default_clarity_score")]
    pub clarity_score: i32,
    #[serde(default)]
    pub clarity_level: Option<ClarityLevel>,
    #[serde(default)]
    pub factors: Vec<String>,
}

fn default_clarity_score() -> i32 {
    3
}

impl Default for ClarityEvaluation {
    fn default() -> Self {
        Self {
            needs_checkpoint: false,
            clarity_score: default_clarity_score(),
            clarity_level: None,
            factors: Vec::new(),
        }
    }
}

/// Layer-1 topical-variation block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariationAnalysis {
    #[serde(default)]
    pub classification: ChangeClass,
    #[serde(default)]
    pub essence_previous: Option<String>,
    #[serde(default)]
    pub essence_new: Option<String>,
    #[serde(default)]
    pub shared_concepts: Vec<String>,
    #[serde(default)]
    pub new_concepts: Vec<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Full layer-1 output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObserverAnalysis {
    #[serde(default)]
    pub clarity_evaluation: ClarityEvaluation,
    #[serde(default)]
    pub variation_analysis: VariationAnalysis,
    #[serde(default)]
    pub needs_checkpoint: bool,
    #[serde(default)]
    pub checkpoint_reason: Option<String>,
}

/// What the observer attaches to the turn: the LLM analysis plus the
/// filter decision, both preserved for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverInsight {
    pub analysis: ObserverAnalysis,
    pub decision: FilterDecision,
}

/// Immutable view of the turn captured before the orchestrator's own LLM
/// call, so the observer works concurrently on stable data.
#[derive(Debug, Clone)]
pub struct ObserverSnapshot {
    pub session_id: String,
    pub turn_number: u32,
    pub turns_since_last_checkpoint: u32,
    pub user_input: String,
    pub prior_focal: FocalArgument,
    pub messages: Vec<ChatMessage>,
}

/// The observer agent
#[derive(Clone)]
pub struct ObserverAgent {
    llm: Arc<LlmService>,
    config: AgentConfig,
    events: EventBus,
    filters: ObserverConfig,
}

impl ObserverAgent {
    /// Create a new observer
    pub fn new(
        llm: Arc<LlmService>,
        config: AgentConfig,
        events: EventBus,
        filters: ObserverConfig,
    ) -> Self {
        Self {
            llm,
            config,
            events,
            filters,
        }
    }

    /// Spawn the observer on a background task. The task writes its insight
    /// into `cell` whenever it finishes; errors never escape.
    pub fn spawn(&self, snapshot: ObserverSnapshot, cell: ObserverCell) -> JoinHandle<()> {
        let agent = self.clone();
        tokio::spawn(async move {
            if let Err(e) = agent.run(snapshot, cell).await {
                warn!(error = %e, "Observer failed; turn continues without insight");
            }
        })
    }

    async fn run(&self, snapshot: ObserverSnapshot, cell: ObserverCell) -> EngineResult<()> {
        let messages = self.build_messages(&snapshot);
        let outcome = self
            .llm
            .invoke(&self.config.model, &messages, &self.config.name)
            .await?;

        let mut analysis = parse_observer_analysis(&outcome.response.content);
        analysis.clarity_evaluation.clarity_score =
            analysis.clarity_evaluation.clarity_score.clamp(1, 5);
        if analysis.clarity_evaluation.clarity_level.is_none() {
            analysis.clarity_evaluation.clarity_level = Some(ClarityLevel::from_score(
                analysis.clarity_evaluation.clarity_score,
            ));
        }

        let decision = apply_filters(
            analysis.needs_checkpoint || analysis.clarity_evaluation.needs_checkpoint,
            snapshot.turn_number,
            analysis.clarity_evaluation.clarity_score,
            analysis.variation_analysis.classification,
            snapshot.turns_since_last_checkpoint,
            &self.filters,
        );

        debug!(
            session_id = %snapshot.session_id,
            turn = snapshot.turn_number,
            classification = ?analysis.variation_analysis.classification,
            clarity = analysis.clarity_evaluation.clarity_score,
            filter = %decision.filter_applied,
            needs_checkpoint = decision.needs_checkpoint,
            "Observer analysis complete"
        );

        self.publish_events(&snapshot, &analysis, &decision);

        cell.set(ObserverInsight { analysis, decision });
        Ok(())
    }

    fn build_messages(&self, snapshot: &ObserverSnapshot) -> Vec<ChatMessage> {
        let focal = serde_json::to_string(&snapshot.prior_focal).unwrap_or_default();
        let context = assemble_context(&snapshot.user_input, &snapshot.messages);

        vec![
            ChatMessage::system(&self.config.prompt),
            ChatMessage::user(format!(
                "ARGUMENTO FOCAL ANTERIOR: {}\n{}",
                focal, context
            )),
        ]
    }

    /// Event publication is best-effort like the rest of the observer
    fn publish_events(
        &self,
        snapshot: &ObserverSnapshot,
        analysis: &ObserverAnalysis,
        decision: &FilterDecision,
    ) {
        let variation = &analysis.variation_analysis;

        let record = if decision.needs_checkpoint {
            match variation.classification {
                ChangeClass::RealChange => EventRecord::new(
                    EventKind::DirectionChangeConfirmed,
                    &snapshot.session_id,
                    snapshot.turn_number,
                )
                .with_field("essence_previous", json!(variation.essence_previous))
                .with_field("essence_new", json!(variation.essence_new))
                .with_field("reason", json!(decision.reason)),
                ChangeClass::Variation => EventRecord::new(
                    EventKind::ClarityCheckpoint,
                    &snapshot.session_id,
                    snapshot.turn_number,
                )
                .with_field(
                    "clarity_score",
                    json!(analysis.clarity_evaluation.clarity_score),
                )
                .with_field("factors", json!(analysis.clarity_evaluation.factors)),
            }
        } else if variation.classification == ChangeClass::Variation {
            EventRecord::new(
                EventKind::VariationDetected,
                &snapshot.session_id,
                snapshot.turn_number,
            )
            .with_field("shared_concepts", json!(variation.shared_concepts))
            .with_field("new_concepts", json!(variation.new_concepts))
            .with_field("filter_applied", json!(decision.filter_applied))
        } else {
            // Real change suppressed by a filter: still worth an audit trail
            EventRecord::new(
                EventKind::VariationDetected,
                &snapshot.session_id,
                snapshot.turn_number,
            )
            .with_field("classification", json!(variation.classification))
            .with_field("filter_applied", json!(decision.filter_applied))
        };

        if let Err(e) = self.events.publish(record) {
            warn!(error = %e, "Failed to publish observer event");
        }
    }
}

/// Lenient parse: a malformed completion degrades to the default analysis,
/// which asks for no checkpoint.
fn parse_observer_analysis(content: &str) -> ObserverAnalysis {
    extract_json(content)
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}
