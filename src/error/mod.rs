use thiserror::Error;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Event log error: {0}")]
    Event(#[from] EventError),

    #[error("Invalid turn state: {message}")]
    State { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },

    #[error("Idea not found: {idea_id}")]
    IdeaNotFound { idea_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("State serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// LLM invocation errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Provider unavailable: {message} (attempts: {attempts})")]
    Unavailable { message: String, attempts: u32 },

    #[error("Circuit breaker open for provider {provider}")]
    CircuitOpen { provider: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("No provider registered for model: {model}")]
    UnknownModel { model: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Event bus errors
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event log I/O failed: {message}")]
    Io { message: String },

    #[error("Event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether this error is the fast-fail raised while a circuit is open.
    ///
    /// Callers can match on this to back off instead of hammering a
    /// provider that is already known to be down.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, LlmError::CircuitOpen { .. })
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for event bus operations
pub type EventResult<T> = Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = EngineError::State {
            message: "no trailing user message".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid turn state: no trailing user message"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::ThreadNotFound {
            thread_id: "thread-123".to_string(),
        };
        assert_eq!(err.to_string(), "Thread not found: thread-123");

        let err = StorageError::IdeaNotFound {
            idea_id: "idea-456".to_string(),
        };
        assert_eq!(err.to_string(), "Idea not found: idea-456");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Unavailable {
            message: "connection refused".to_string(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Provider unavailable: connection refused (attempts: 3)"
        );

        let err = LlmError::CircuitOpen {
            provider: "anthropic".to_string(),
        };
        assert_eq!(err.to_string(), "Circuit breaker open for provider anthropic");

        let err = LlmError::UnknownModel {
            model: "gpt-99".to_string(),
        };
        assert_eq!(err.to_string(), "No provider registered for model: gpt-99");
    }

    #[test]
    fn test_circuit_open_is_distinguishable() {
        let open = LlmError::CircuitOpen {
            provider: "maritaca".to_string(),
        };
        assert!(open.is_circuit_open());

        let other = LlmError::Timeout { timeout_ms: 5000 };
        assert!(!other.is_circuit_open());
    }

    #[test]
    fn test_llm_error_conversion_to_engine_error() {
        let llm_err = LlmError::Timeout { timeout_ms: 1000 };
        let engine_err: EngineError = llm_err.into();
        assert!(matches!(engine_err, EngineError::Llm(_)));
    }

    #[test]
    fn test_storage_error_conversion_to_engine_error() {
        let storage_err = StorageError::ThreadNotFound {
            thread_id: "t".to_string(),
        };
        let engine_err: EngineError = storage_err.into();
        assert!(matches!(engine_err, EngineError::Storage(_)));
    }
}
