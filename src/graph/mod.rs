//! The turn graph: composes the agents with conditional routing,
//! instruments every node with events and telemetry, and commits the final
//! state to the checkpoint store keyed by thread id.
//!
//! Node execution inside a turn is strictly sequential; only the observer
//! runs concurrently, as a side effect of the orchestrator node.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info};

use crate::agents::catalog::{
    AgentCatalog, METHODOLOGIST, OBSERVER, ORCHESTRATOR, STRUCTURER,
};
use crate::agents::{
    ClarificationChannel, MethodologistAgent, ObserverAgent, OrchestratorAgent, StructurerAgent,
};
use crate::config::Config;
use crate::error::EngineResult;
use crate::events::{EventBus, EventKind, EventRecord};
use crate::llm::LlmService;
use crate::state::{AgentKind, NextStep, TurnState};
use crate::storage::{SqliteStorage, Storage};

/// Per-invocation configuration, the analogue of the `configurable` block
/// callers pass alongside the state.
#[derive(Debug, Clone)]
pub struct InvokeConfig {
    /// Durable conversation thread this turn belongs to
    pub thread_id: String,
    /// Idea to snapshot when the cognitive model matures
    pub active_idea_id: Option<String>,
}

impl InvokeConfig {
    /// Configuration for a thread without an idea binding
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            active_idea_id: None,
        }
    }

    /// Bind an active idea for the snapshot hook
    pub fn with_idea(mut self, idea_id: impl Into<String>) -> Self {
        self.active_idea_id = Some(idea_id.into());
        self
    }
}

/// Snapshot returned by [`TurnGraph::get_state`]
#[derive(Debug, Clone)]
pub struct StateView {
    /// The last committed turn state of the thread
    pub values: TurnState,
}

enum Route {
    Structurer,
    Methodologist,
    End,
}

/// The directed turn graph
pub struct TurnGraph {
    orchestrator: OrchestratorAgent,
    structurer: StructurerAgent,
    methodologist: MethodologistAgent,
    storage: SqliteStorage,
    events: EventBus,
}

impl TurnGraph {
    /// Wire the graph from shared infrastructure and the agent catalog
    pub fn new(
        config: &Config,
        storage: SqliteStorage,
        llm: Arc<LlmService>,
        events: EventBus,
        catalog: &AgentCatalog,
    ) -> EngineResult<Self> {
        let observer = ObserverAgent::new(
            Arc::clone(&llm),
            catalog.get(OBSERVER)?.clone(),
            events.clone(),
            config.observer.clone(),
        );

        let orchestrator = OrchestratorAgent::new(
            Arc::clone(&llm),
            catalog.get(ORCHESTRATOR)?.clone(),
            events.clone(),
            storage.clone(),
            observer,
            config.model.clone(),
            config.observer.clone(),
        );

        let structurer = StructurerAgent::new(Arc::clone(&llm), catalog.get(STRUCTURER)?.clone());

        let methodologist =
            MethodologistAgent::new(Arc::clone(&llm), catalog.get(METHODOLOGIST)?.clone());

        Ok(Self {
            orchestrator,
            structurer,
            methodologist,
            storage,
            events,
        })
    }

    /// Replace the methodologist's clarification channel
    pub fn with_clarification_channel(mut self, channel: Arc<dyn ClarificationChannel>) -> Self {
        self.methodologist = self.methodologist.with_channel(channel);
        self
    }

    /// Run one turn: orchestrator, conditional routing, checkpoint commit.
    ///
    /// LLM transport failures after retry exhaustion, open circuits and
    /// checkpoint-store failures propagate to the caller; observer and
    /// snapshot failures never do.
    pub async fn invoke(
        &self,
        mut state: TurnState,
        config: &InvokeConfig,
    ) -> EngineResult<TurnState> {
        state.validate_initial()?;

        if let Some(prior) = self.storage.load_checkpoint(&config.thread_id).await? {
            debug!(
                thread_id = %config.thread_id,
                prior_turns = prior.turn_count,
                "Resuming thread from checkpoint"
            );
            state.merge_prior(prior);
        }
        state.idea_id = config.active_idea_id.clone().or(state.idea_id.take());

        // Orchestrator node (fires the observer side effect internally)
        self.node_started(ORCHESTRATOR, &state)?;
        state.reset_telemetry();
        let start = Instant::now();
        let result = self
            .orchestrator
            .run(&mut state, config.active_idea_id.as_deref())
            .await;
        self.node_completed(ORCHESTRATOR, &state, start, result.is_ok())?;
        result?;

        match route(&state) {
            Route::Structurer => {
                self.node_started(STRUCTURER, &state)?;
                state.reset_telemetry();
                let start = Instant::now();
                let result = self.structurer.run(&mut state).await;
                self.node_completed(STRUCTURER, &state, start, result.is_ok())?;
                result?;

                self.node_started(METHODOLOGIST, &state)?;
                state.reset_telemetry();
                let start = Instant::now();
                let result = self.methodologist.run(&mut state).await;
                self.node_completed(METHODOLOGIST, &state, start, result.is_ok())?;
                result?;
            }
            Route::Methodologist => {
                self.node_started(METHODOLOGIST, &state)?;
                state.reset_telemetry();
                let start = Instant::now();
                let result = self.methodologist.run(&mut state).await;
                self.node_completed(METHODOLOGIST, &state, start, result.is_ok())?;
                result?;
            }
            Route::End => {}
        }

        self.storage
            .save_checkpoint(&config.thread_id, &state)
            .await?;

        info!(
            thread_id = %config.thread_id,
            turn = state.turn_count,
            next_step = ?state.next_step,
            stage = %state.current_stage,
            "Turn committed"
        );

        Ok(state)
    }

    /// Re-hydrate the last committed state of a thread
    pub async fn get_state(&self, config: &InvokeConfig) -> EngineResult<Option<StateView>> {
        Ok(self
            .storage
            .load_checkpoint(&config.thread_id)
            .await?
            .map(|values| StateView { values }))
    }

    fn node_started(&self, name: &str, state: &TurnState) -> EngineResult<()> {
        self.events.publish(
            EventRecord::new(EventKind::AgentStarted, &state.session_id, state.turn_count)
                .with_field("agent", json!(name))
                .with_field("stage", json!(state.current_stage)),
        )?;
        Ok(())
    }

    fn node_completed(
        &self,
        name: &str,
        state: &TurnState,
        started: Instant,
        success: bool,
    ) -> EngineResult<()> {
        self.events.publish(
            EventRecord::new(
                EventKind::AgentCompleted,
                &state.session_id,
                state.turn_count,
            )
            .with_field("agent", json!(name))
            .with_field("duration_ms", json!(started.elapsed().as_millis() as u64))
            .with_field("tokens_input", json!(state.last_agent_tokens_input))
            .with_field("tokens_output", json!(state.last_agent_tokens_output))
            .with_field("cost", json!(state.last_agent_cost))
            .with_field("success", json!(success)),
        )?;
        Ok(())
    }
}

/// Conditional routing out of the orchestrator
fn route(state: &TurnState) -> Route {
    match (state.next_step, &state.agent_suggestion) {
        (Some(NextStep::SuggestAgent), Some(suggestion)) => match suggestion.agent {
            AgentKind::Structurer => Route::Structurer,
            AgentKind::Methodologist => Route::Methodologist,
        },
        _ => Route::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentSuggestion;

    fn state_with(next_step: Option<NextStep>, agent: Option<AgentKind>) -> TurnState {
        let mut state = TurnState::for_message("sess", "oi");
        state.next_step = next_step;
        state.agent_suggestion = agent.map(|agent| AgentSuggestion {
            agent,
            justification: "teste".to_string(),
        });
        state
    }

    #[test]
    fn test_route_to_structurer() {
        let state = state_with(Some(NextStep::SuggestAgent), Some(AgentKind::Structurer));
        assert!(matches!(route(&state), Route::Structurer));
    }

    #[test]
    fn test_route_to_methodologist() {
        let state = state_with(Some(NextStep::SuggestAgent), Some(AgentKind::Methodologist));
        assert!(matches!(route(&state), Route::Methodologist));
    }

    #[test]
    fn test_explore_and_clarify_end_the_turn() {
        let state = state_with(Some(NextStep::Explore), None);
        assert!(matches!(route(&state), Route::End));

        let state = state_with(Some(NextStep::Clarify), None);
        assert!(matches!(route(&state), Route::End));
    }

    #[test]
    fn test_suggestion_without_suggest_agent_ends() {
        let state = state_with(Some(NextStep::Explore), Some(AgentKind::Structurer));
        assert!(matches!(route(&state), Route::End));
    }

    #[test]
    fn test_suggest_agent_without_suggestion_ends() {
        let state = state_with(Some(NextStep::SuggestAgent), None);
        assert!(matches!(route(&state), Route::End));
    }
}
