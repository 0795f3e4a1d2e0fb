use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{Argument, Idea, IdeaSnapshot, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::state::TurnState;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory storage for tests. A single shared connection keeps every
    /// caller on the same database; the pool serializes writes.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_checkpoint(&self, thread_id: &str, state: &TurnState) -> StorageResult<()> {
        let serialized =
            serde_json::to_string(state).map_err(|e| StorageError::Serialization {
                message: format!("Failed to serialize turn state: {}", e),
            })?;

        sqlx::query(
            r#"
            INSERT INTO thread_checkpoints (thread_id, session_id, turn_count, state, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(thread_id) DO UPDATE SET
                session_id = excluded.session_id,
                turn_count = excluded.turn_count,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(thread_id)
        .bind(&state.session_id)
        .bind(state.turn_count as i64)
        .bind(&serialized)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_checkpoint(&self, thread_id: &str) -> StorageResult<Option<TurnState>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT state
            FROM thread_checkpoints
            WHERE thread_id = ?
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((state,)) => {
                let state = serde_json::from_str(&state).map_err(|e| {
                    StorageError::Serialization {
                        message: format!("Failed to deserialize turn state: {}", e),
                    }
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn create_idea(&self, idea: &Idea) -> StorageResult<()> {
        let metadata = idea
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO ideas (id, title, description, thread_id, created_at, updated_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&idea.id)
        .bind(&idea.title)
        .bind(&idea.description)
        .bind(&idea.thread_id)
        .bind(idea.created_at.to_rfc3339())
        .bind(idea.updated_at.to_rfc3339())
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_idea(&self, id: &str) -> StorageResult<Option<Idea>> {
        let row: Option<IdeaRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, thread_id, created_at, updated_at, metadata
            FROM ideas
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_idea(&self, idea: &Idea) -> StorageResult<()> {
        let metadata = idea
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default());

        let result = sqlx::query(
            r#"
            UPDATE ideas
            SET title = ?, description = ?, thread_id = ?, updated_at = ?, metadata = ?
            WHERE id = ?
            "#,
        )
        .bind(&idea.title)
        .bind(&idea.description)
        .bind(&idea.thread_id)
        .bind(Utc::now().to_rfc3339())
        .bind(&metadata)
        .bind(&idea.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::IdeaNotFound {
                idea_id: idea.id.clone(),
            });
        }

        Ok(())
    }

    async fn list_ideas(&self) -> StorageResult<Vec<Idea>> {
        let rows: Vec<IdeaRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, thread_id, created_at, updated_at, metadata
            FROM ideas
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_argument(&self, argument: &Argument) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO arguments (id, idea_id, text, solidity, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&argument.id)
        .bind(&argument.idea_id)
        .bind(&argument.text)
        .bind(argument.solidity)
        .bind(argument.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_arguments_by_idea(&self, idea_id: &str) -> StorageResult<Vec<Argument>> {
        let rows: Vec<ArgumentRow> = sqlx::query_as(
            r#"
            SELECT id, idea_id, text, solidity, created_at
            FROM arguments
            WHERE idea_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(idea_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_snapshot(&self, snapshot: &IdeaSnapshot) -> StorageResult<()> {
        let model = serde_json::to_string(&snapshot.cognitive_model).map_err(|e| {
            StorageError::Serialization {
                message: format!("Failed to serialize snapshot model: {}", e),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO idea_snapshots (id, idea_id, cognitive_model, maturity, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.id)
        .bind(&snapshot.idea_id)
        .bind(&model)
        .bind(snapshot.maturity)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshots_by_idea(&self, idea_id: &str) -> StorageResult<Vec<IdeaSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT id, idea_id, cognitive_model, maturity, created_at
            FROM idea_snapshots
            WHERE idea_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(idea_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// Internal row types for SQLx mapping

#[derive(sqlx::FromRow)]
struct IdeaRow {
    id: String,
    title: String,
    description: Option<String>,
    thread_id: Option<String>,
    created_at: String,
    updated_at: String,
    metadata: Option<String>,
}

impl From<IdeaRow> for Idea {
    fn from(row: IdeaRow) -> Self {
        Idea {
            id: row.id,
            title: row.title,
            description: row.description,
            thread_id: row.thread_id,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            metadata: row.metadata.and_then(|m| serde_json::from_str(&m).ok()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArgumentRow {
    id: String,
    idea_id: String,
    text: String,
    solidity: Option<f64>,
    created_at: String,
}

impl From<ArgumentRow> for Argument {
    fn from(row: ArgumentRow) -> Self {
        Argument {
            id: row.id,
            idea_id: row.idea_id,
            text: row.text,
            solidity: row.solidity,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    idea_id: String,
    cognitive_model: String,
    maturity: f64,
    created_at: String,
}

impl From<SnapshotRow> for IdeaSnapshot {
    fn from(row: SnapshotRow) -> Self {
        IdeaSnapshot {
            id: row.id,
            idea_id: row.idea_id,
            cognitive_model: serde_json::from_str(&row.cognitive_model)
                .unwrap_or(serde_json::Value::Null),
            maturity: row.maturity,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
