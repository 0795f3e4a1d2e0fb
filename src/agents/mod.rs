//! The cognitive agents: orchestrator, observer (with its deterministic
//! filter layer), structurer and methodologist, plus the cached agent
//! configuration catalog.

pub mod catalog;
pub mod context;
pub mod filters;
pub mod methodologist;
pub mod observer;
pub mod orchestrator;
pub mod structurer;

pub use catalog::{AgentCatalog, AgentConfig, ContextLimits};
pub use methodologist::{
    ClarificationChannel, MethodologistAgent, MethodologistOutput, MethodologyStatus,
    NoClarification,
};
pub use observer::{ObserverAgent, ObserverInsight};
pub use orchestrator::OrchestratorAgent;
pub use structurer::{StructurerAgent, StructurerOutput};

use serde_json::Value;

/// Pull a JSON object out of an LLM completion.
///
/// Models wrap JSON in markdown fences or prose often enough that every
/// agent parses leniently: try the raw text, then the fenced block, then
/// the outermost brace span. `None` means the completion carries no JSON
/// object at all.
pub(crate) fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim);
    if let Some(unfenced) = unfenced {
        if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| v.is_object())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"next_step": "explore"}"#).unwrap();
        assert_eq!(value["next_step"], "explore");
    }

    #[test]
    fn test_extract_fenced_json() {
        let content = "```json\n{\"status\": \"approved\"}\n```";
        let value = extract_json(content).unwrap();
        assert_eq!(value["status"], "approved");
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let content = "Aqui está a análise: {\"clarity_score\": 4} espero que ajude";
        let value = extract_json(content).unwrap();
        assert_eq!(value["clarity_score"], 4);
    }

    #[test]
    fn test_extract_rejects_non_object() {
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("apenas texto").is_none());
    }
}
