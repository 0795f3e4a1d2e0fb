use std::env;
use std::path::PathBuf;

use crate::error::EngineError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub events: EventConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub observer: ObserverConfig,
    pub model: ModelConfig,
    pub telemetry: TelemetryConfig,
    pub agents: AgentSourceConfig,
}

/// LLM provider credentials and endpoints
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub maritaca_api_key: Option<String>,
    pub maritaca_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Event log configuration
#[derive(Debug, Clone)]
pub struct EventConfig {
    pub dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// LLM request configuration: retry and circuit-breaker policy
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    /// Total attempts per invocation (first call plus retries).
    pub max_attempts: u32,
    /// Backoff after the n-th failed attempt is `base * 2^(n-1)` seconds.
    pub backoff_base_secs: u64,
    /// Consecutive failures that open the provider circuit.
    pub breaker_failure_threshold: u32,
}

/// Observer checkpoint-filter thresholds
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Turns at or below this never trigger a checkpoint (cold start).
    pub min_turn_for_checkpoint: u32,
    /// Clarity scores at or above this suppress the checkpoint.
    pub min_clarity_score_for_exemption: i32,
    /// Minimum turns between two user-facing checkpoints.
    pub min_turns_between_checkpoints: u32,
    /// How long the orchestrator waits for the background observer
    /// before routing the turn without it.
    pub grace_ms: u64,
}

/// Cognitive-model policy thresholds
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Contradictions below this confidence are dropped before persisting.
    pub contradiction_confidence_threshold: f64,
    /// Aggregate solidity at which an idea snapshot is written.
    pub snapshot_maturity_threshold: f64,
}

/// Cost-display configuration (telemetry only)
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub currency: Currency,
    pub usd_to_brl_rate: f64,
}

/// Display currency for per-turn cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Brl,
}

/// Where agent configurations come from
#[derive(Debug, Clone)]
pub struct AgentSourceConfig {
    /// Optional directory of YAML files overriding the built-in agent
    /// configs. Loaded once at startup and cached.
    pub config_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, EngineError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
            anthropic_base_url: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            maritaca_api_key: env::var("MARITACA_API_KEY").ok().filter(|k| !k.is_empty()),
            maritaca_base_url: env::var("MARITACA_BASE_URL")
                .unwrap_or_else(|_| "https://chat.maritaca.ai/api".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/socratic.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let events = EventConfig {
            dir: PathBuf::from(
                env::var("EVENT_LOG_DIR").unwrap_or_else(|_| "./data/events".to_string()),
            ),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 60_000),
            max_attempts: parse_env("MAX_ATTEMPTS", 3),
            backoff_base_secs: parse_env("RETRY_BASE_SECS", 2),
            breaker_failure_threshold: parse_env("BREAKER_FAILURE_THRESHOLD", 5),
        };

        let observer = ObserverConfig {
            min_turn_for_checkpoint: parse_env("MIN_TURN_FOR_CHECKPOINT", 1),
            min_clarity_score_for_exemption: parse_env("MIN_CLARITY_SCORE_FOR_EXEMPTION", 4),
            min_turns_between_checkpoints: parse_env("MIN_TURNS_BETWEEN_CHECKPOINTS", 3),
            grace_ms: parse_env("OBSERVER_GRACE_MS", 250),
        };

        let model = ModelConfig {
            contradiction_confidence_threshold: parse_env(
                "CONTRADICTION_CONFIDENCE_THRESHOLD",
                0.80,
            ),
            snapshot_maturity_threshold: parse_env("SNAPSHOT_MATURITY_THRESHOLD", 0.8),
        };

        let telemetry = TelemetryConfig {
            currency: match env::var("CURRENCY")
                .unwrap_or_else(|_| "USD".to_string())
                .to_uppercase()
                .as_str()
            {
                "BRL" => Currency::Brl,
                _ => Currency::Usd,
            },
            usd_to_brl_rate: parse_env("USD_TO_BRL_RATE", 5.0),
        };

        let agents = AgentSourceConfig {
            config_dir: env::var("AGENT_CONFIG_DIR").ok().map(PathBuf::from),
        };

        let config = Config {
            llm,
            database,
            events,
            logging,
            request,
            observer,
            model,
            telemetry,
            agents,
        };
        config.validate()?;
        Ok(config)
    }

    /// Startup-time validation. Per-turn code never re-checks these.
    fn validate(&self) -> Result<(), EngineError> {
        if self.request.max_attempts == 0 {
            return Err(EngineError::Config {
                message: "MAX_ATTEMPTS must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.model.contradiction_confidence_threshold) {
            return Err(EngineError::Config {
                message: "CONTRADICTION_CONFIDENCE_THRESHOLD must be within [0,1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.model.snapshot_maturity_threshold) {
            return Err(EngineError::Config {
                message: "SNAPSHOT_MATURITY_THRESHOLD must be within [0,1]".to_string(),
            });
        }
        if let Some(dir) = &self.agents.config_dir {
            if !dir.is_dir() {
                return Err(EngineError::Config {
                    message: format!("AGENT_CONFIG_DIR is not a directory: {}", dir.display()),
                });
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_attempts: 3,
            backoff_base_secs: 2,
            breaker_failure_threshold: 5,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            min_turn_for_checkpoint: 1,
            min_clarity_score_for_exemption: 4,
            min_turns_between_checkpoints: 3,
            grace_ms: 250,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            contradiction_confidence_threshold: 0.80,
            snapshot_maturity_threshold: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_config_defaults() {
        let config = RequestConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base_secs, 2);
        assert_eq!(config.breaker_failure_threshold, 5);
    }

    #[test]
    fn test_observer_config_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.min_turn_for_checkpoint, 1);
        assert_eq!(config.min_clarity_score_for_exemption, 4);
        assert_eq!(config.min_turns_between_checkpoints, 3);
    }

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::default();
        assert!((config.contradiction_confidence_threshold - 0.80).abs() < f64::EPSILON);
    }
}
