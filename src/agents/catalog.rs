//! Agent configuration catalog.
//!
//! Built-in defaults can be overridden by YAML files in `AGENT_CONFIG_DIR`
//! (one file per agent, named `<agent>.yaml`). The catalog is loaded once at
//! startup and read-only afterwards.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::prompts;

/// Agent name constants, also the YAML file stems
pub const ORCHESTRATOR: &str = "orchestrator";
pub const OBSERVER: &str = "observer";
pub const STRUCTURER: &str = "structurer";
pub const METHODOLOGIST: &str = "methodologist";

/// Token budget for one agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextLimits {
    pub max_input_tokens: u32,
    pub max_output_tokens: u32,
    pub max_total_tokens: u32,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_input_tokens: 12_000,
            max_output_tokens: 4_096,
            max_total_tokens: 16_096,
        }
    }
}

/// Full configuration of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub context_limits: ContextLimits,
}

/// Partial override loaded from a YAML file
#[derive(Debug, Deserialize)]
struct AgentOverride {
    prompt: Option<String>,
    model: Option<String>,
    context_limits: Option<ContextLimits>,
}

/// In-memory agent configuration catalog
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    agents: HashMap<String, AgentConfig>,
}

impl AgentCatalog {
    /// Load the catalog: built-in defaults, then YAML overrides if a
    /// directory was configured. Invalid YAML fails startup.
    pub fn load(config_dir: Option<&Path>) -> EngineResult<Self> {
        let mut agents = builtin_agents();

        if let Some(dir) = config_dir {
            for (name, config) in agents.iter_mut() {
                let path = ["yaml", "yml"]
                    .iter()
                    .map(|ext| dir.join(format!("{}.{}", name, ext)))
                    .find(|p| p.is_file());

                let Some(path) = path else { continue };

                let raw = std::fs::read_to_string(&path).map_err(|e| EngineError::Config {
                    message: format!("Failed to read agent config {}: {}", path.display(), e),
                })?;
                let patch: AgentOverride =
                    serde_yaml::from_str(&raw).map_err(|e| EngineError::Config {
                        message: format!("Invalid agent config {}: {}", path.display(), e),
                    })?;

                if let Some(prompt) = patch.prompt {
                    config.prompt = prompt;
                }
                if let Some(model) = patch.model {
                    config.model = model;
                }
                if let Some(limits) = patch.context_limits {
                    config.context_limits = limits;
                }

                info!(agent = %name, path = %path.display(), "Applied agent config override");
            }
        }

        Ok(Self { agents })
    }

    /// Look up an agent by name
    pub fn get(&self, name: &str) -> EngineResult<&AgentConfig> {
        self.agents.get(name).ok_or_else(|| EngineError::Config {
            message: format!("Unknown agent: {}", name),
        })
    }
}

fn builtin_agents() -> HashMap<String, AgentConfig> {
    let defaults = [
        (
            ORCHESTRATOR,
            prompts::ORCHESTRATOR_PROMPT,
            "claude-3-5-sonnet-20241022",
        ),
        (
            OBSERVER,
            prompts::OBSERVER_PROMPT,
            "claude-3-5-haiku-20241022",
        ),
        (STRUCTURER, prompts::STRUCTURER_PROMPT, "sabia-3"),
        (
            METHODOLOGIST,
            prompts::METHODOLOGIST_PROMPT,
            "claude-3-5-sonnet-20241022",
        ),
    ];

    defaults
        .into_iter()
        .map(|(name, prompt, model)| {
            (
                name.to_string(),
                AgentConfig {
                    name: name.to_string(),
                    prompt: prompt.to_string(),
                    model: model.to_string(),
                    context_limits: ContextLimits::default(),
                },
            )
        })
        .collect()
}
