//! # Socratic Engine
//!
//! A Socratic research-assistant conversation engine. A user brings a vague
//! observation ("LLMs seem to boost productivity") and, through multi-turn
//! dialogue, the engine matures it into a scientifically rigorous, testable
//! hypothesis.
//!
//! ## Architecture
//!
//! ```text
//! user message → TurnGraph
//!                  ├─ orchestrator (primary LLM call, observer side effect)
//!                  ├─ conditional route on next_step
//!                  │    ├─ structurer → methodologist
//!                  │    └─ methodologist
//!                  └─ checkpoint (SQLite, keyed by thread_id)
//! ```
//!
//! Each turn flows a [`state::TurnState`] through the graph. The observer
//! runs on a background task and never blocks the reply; its two layers
//! separate LLM judgment (what changed, how clear) from deterministic
//! policy (which checkpoints survive).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use socratic_engine::{
//!     AgentCatalog, Config, EventBus, InvokeConfig, LlmService, SqliteStorage,
//!     TurnGraph, TurnState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let events = EventBus::new(&config.events.dir)?;
//!     let llm = Arc::new(LlmService::from_config(&config)?);
//!     let catalog = AgentCatalog::load(config.agents.config_dir.as_deref())?;
//!     let graph = TurnGraph::new(&config, storage, llm, events, &catalog)?;
//!
//!     let state = TurnState::for_new_session("LLMs aumentam produtividade");
//!     let final_state = graph
//!         .invoke(state, &InvokeConfig::new("thread-1"))
//!         .await?;
//!     println!("{}", final_state.messages.last().unwrap().content);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// The cognitive agents and their configuration catalog.
pub mod agents;
/// Configuration management loaded from environment variables.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Append-only per-session event log.
pub mod events;
/// The directed turn graph and its invocation API.
pub mod graph;
/// LLM invocation service with retry, circuit breaking and pricing.
pub mod llm;
/// Cognitive model and proposition types.
pub mod model;
/// Centralized system prompts for the agents.
pub mod prompts;
/// Shared turn state flowing through the graph.
pub mod state;
/// SQLite persistence for checkpoints, ideas and snapshots.
pub mod storage;

pub use agents::AgentCatalog;
pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use events::EventBus;
pub use graph::{InvokeConfig, StateView, TurnGraph};
pub use llm::LlmService;
pub use model::{CognitiveModel, FocalArgument, Proposition};
pub use state::TurnState;
pub use storage::SqliteStorage;
