//! Storage layer for thread checkpoints, ideas, arguments and maturity
//! snapshots, backed by SQLite.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::model::CognitiveModel;
use crate::state::TurnState;

/// A research idea a conversation thread can be bound to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    /// Unique idea identifier.
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Conversation thread currently bound to this idea.
    pub thread_id: Option<String>,
    /// When the idea was created.
    pub created_at: DateTime<Utc>,
    /// When the idea was last updated.
    pub updated_at: DateTime<Utc>,
    /// Optional metadata.
    pub metadata: Option<serde_json::Value>,
}

/// A supporting or opposing argument attached to an idea
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    /// Unique argument identifier.
    pub id: String,
    /// Parent idea ID.
    pub idea_id: String,
    /// The argument text.
    pub text: String,
    /// Solidity grade (0.0-1.0), `None` until evaluated.
    pub solidity: Option<f64>,
    /// When the argument was created.
    pub created_at: DateTime<Utc>,
}

/// A persisted cognitive-model snapshot taken when an idea matured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaSnapshot {
    /// Unique snapshot identifier.
    pub id: String,
    /// Parent idea ID.
    pub idea_id: String,
    /// Serialized cognitive model at snapshot time.
    pub cognitive_model: serde_json::Value,
    /// Aggregate solidity that triggered the snapshot.
    pub maturity: f64,
    /// When the snapshot was created.
    pub created_at: DateTime<Utc>,
}

impl Idea {
    /// Create a new idea with the given title
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            thread_id: None,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bind the idea to a conversation thread
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

impl Argument {
    /// Create a new argument under an idea
    pub fn new(idea_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            idea_id: idea_id.into(),
            text: text.into(),
            solidity: None,
            created_at: Utc::now(),
        }
    }

    /// Set the solidity grade, clamped to [0,1]
    pub fn with_solidity(mut self, solidity: f64) -> Self {
        self.solidity = Some(solidity.clamp(0.0, 1.0));
        self
    }
}

impl IdeaSnapshot {
    /// Create a new snapshot
    pub fn new(
        idea_id: impl Into<String>,
        cognitive_model: serde_json::Value,
        maturity: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            idea_id: idea_id.into(),
            cognitive_model,
            maturity,
            created_at: Utc::now(),
        }
    }
}

/// Storage trait for database operations.
///
/// Thread checkpoints carry the full serialized turn state; idea operations
/// exist for the orchestrator's snapshot hook and thread-id resolution.
#[async_trait]
pub trait Storage: Send + Sync {
    // Thread checkpoint operations

    /// Persist the turn state for a thread (upsert).
    async fn save_checkpoint(&self, thread_id: &str, state: &TurnState) -> StorageResult<()>;
    /// Load the last committed turn state of a thread.
    async fn load_checkpoint(&self, thread_id: &str) -> StorageResult<Option<TurnState>>;

    // Idea operations

    /// Create a new idea.
    async fn create_idea(&self, idea: &Idea) -> StorageResult<()>;
    /// Get an idea by ID.
    async fn get_idea(&self, id: &str) -> StorageResult<Option<Idea>>;
    /// Update an existing idea (title, description, thread binding).
    async fn update_idea(&self, idea: &Idea) -> StorageResult<()>;
    /// List all ideas, most recently updated first.
    async fn list_ideas(&self) -> StorageResult<Vec<Idea>>;

    // Argument operations

    /// Create a new argument.
    async fn create_argument(&self, argument: &Argument) -> StorageResult<()>;
    /// Get all arguments of an idea in creation order.
    async fn get_arguments_by_idea(&self, idea_id: &str) -> StorageResult<Vec<Argument>>;

    // Snapshot operations

    /// Persist a maturity snapshot.
    async fn create_snapshot(&self, snapshot: &IdeaSnapshot) -> StorageResult<()>;
    /// Get all snapshots of an idea in creation order.
    async fn get_snapshots_by_idea(&self, idea_id: &str) -> StorageResult<Vec<IdeaSnapshot>>;

    /// Write a snapshot only when the model's aggregate maturity reaches
    /// the threshold. Returns the snapshot id, or `None` when the model is
    /// not mature enough (or has no evaluated propositions at all).
    async fn create_snapshot_if_mature(
        &self,
        idea_id: &str,
        model: &CognitiveModel,
        threshold: f64,
    ) -> StorageResult<Option<String>> {
        let Some(maturity) = model.maturity() else {
            return Ok(None);
        };
        if maturity < threshold {
            return Ok(None);
        }

        if self.get_idea(idea_id).await?.is_none() {
            return Err(StorageError::IdeaNotFound {
                idea_id: idea_id.to_string(),
            });
        }

        let model_json =
            serde_json::to_value(model).map_err(|e| StorageError::Serialization {
                message: format!("Failed to serialize cognitive model: {}", e),
            })?;
        let snapshot = IdeaSnapshot::new(idea_id, model_json, maturity);
        self.create_snapshot(&snapshot).await?;
        Ok(Some(snapshot.id))
    }
}
