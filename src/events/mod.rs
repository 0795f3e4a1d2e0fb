//! Append-only per-session event log.
//!
//! Each session gets one JSONL file under the configured directory. Events
//! are written in publish order; timestamps are monotonic per session within
//! a single process even if the wall clock regresses.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EventError, EventResult};

/// Kinds of events the engine publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStarted,
    AgentCompleted,
    CognitiveModelUpdated,
    VariationDetected,
    DirectionChangeConfirmed,
    ClarityCheckpoint,
}

impl EventKind {
    /// Stable string form used in the serialized records
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStarted => "agent_started",
            EventKind::AgentCompleted => "agent_completed",
            EventKind::CognitiveModelUpdated => "cognitive_model_updated",
            EventKind::VariationDetected => "variation_detected",
            EventKind::DirectionChangeConfirmed => "direction_change_confirmed",
            EventKind::ClarityCheckpoint => "clarity_checkpoint",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single record in a session's event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventKind,
    pub session_id: String,
    pub turn_number: u32,
    /// Assigned by the bus at publish time, monotonic per session
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
    /// Type-specific fields, flattened into the record
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, Value>,
}

impl EventRecord {
    /// Create a record with empty metadata
    pub fn new(event_type: EventKind, session_id: impl Into<String>, turn_number: u32) -> Self {
        Self {
            event_type,
            session_id: session_id.into(),
            turn_number,
            timestamp: None,
            metadata: Value::Object(serde_json::Map::new()),
            extra: serde_json::Map::new(),
        }
    }

    /// Set the metadata object
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a type-specific field at the top level of the record
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Append-only event bus backed by one JSONL file per session
#[derive(Clone)]
pub struct EventBus {
    dir: PathBuf,
    /// Last timestamp issued per session, for monotonicity
    clocks: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl EventBus {
    /// Create a bus rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> EventResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| EventError::Io {
            message: format!("Failed to create event log directory: {}", e),
        })?;
        Ok(Self {
            dir,
            clocks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Append one record to the session's log.
    ///
    /// The bus assigns the timestamp: at least 1ms past the previous event
    /// of the same session, so readers can rely on ordering.
    pub fn publish(&self, mut record: EventRecord) -> EventResult<()> {
        let timestamp = {
            let mut clocks = self.clocks.lock().unwrap_or_else(|e| e.into_inner());
            let now = Utc::now();
            let ts = match clocks.get(&record.session_id) {
                Some(last) if now <= *last => *last + Duration::milliseconds(1),
                _ => now,
            };
            clocks.insert(record.session_id.clone(), ts);
            ts
        };
        record.timestamp = Some(timestamp);

        let line = serde_json::to_string(&record)?;
        let path = self.session_path(&record.session_id);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EventError::Io {
                message: format!("Failed to open event log {}: {}", path.display(), e),
            })?;

        writeln!(file, "{}", line).map_err(|e| EventError::Io {
            message: format!("Failed to append event: {}", e),
        })?;

        Ok(())
    }

    /// Read all events of a session in publish order.
    /// A session with no events yet reads as an empty list.
    pub fn read_session(&self, session_id: &str) -> EventResult<Vec<EventRecord>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path).map_err(|e| EventError::Io {
            message: format!("Failed to open event log {}: {}", path.display(), e),
        })?;

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| EventError::Io {
                message: format!("Failed to read event log: {}", e),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        // Session ids are uuids in practice, but sanitize anyway
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.jsonl", safe))
    }
}
