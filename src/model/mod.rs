//! Cognitive model: the structured representation of the user's evolving
//! argument, accumulated across turns by the orchestrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default solidity threshold above which a proposition counts as solid
pub const SOLID_THRESHOLD: f64 = 0.6;
/// Default solidity threshold below which a proposition counts as fragile
pub const FRAGILE_THRESHOLD: f64 = 0.4;
/// Claim fallback is truncated to this many characters
pub const CLAIM_FALLBACK_MAX_CHARS: usize = 200;

/// An assertion about the world with a solidity grade derived from evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposition {
    /// Stable identifier. Assigned on normalization when the LLM omits it.
    #[serde(default)]
    pub id: String,
    /// Natural-language statement
    pub text: String,
    /// Solidity in [0,1]; `None` means not yet evaluated
    #[serde(default)]
    pub solidity: Option<f64>,
    /// Evidence identifiers, populated by a future researcher agent
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

/// A detected tension inside the argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub description: String,
    /// Confidence in [0,1] that the contradiction is real
    pub confidence: f64,
}

/// Fixed-key conversational context extracted by the orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgumentContext {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub population: Option<String>,
    #[serde(default)]
    pub metrics: Option<String>,
    #[serde(default)]
    pub article_type: Option<String>,
}

/// The cumulative understanding of the user's argument at turn end.
///
/// Overwritten each turn by the orchestrator, which is instructed to merge
/// prior knowledge, so in practice it is monotonically enriched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CognitiveModel {
    /// Central assertion; may be empty early in a conversation
    #[serde(default)]
    pub claim: String,
    /// Sub-assertions the claim rests on, in the order the LLM returned them
    #[serde(default)]
    pub propositions: Vec<Proposition>,
    /// What remains unclear or unspecified
    #[serde(default)]
    pub open_questions: Vec<String>,
    /// Detected tensions; only confident entries survive persistence
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    /// Propositions already considered well-supported
    #[serde(default)]
    pub solid_grounds: Vec<Proposition>,
    #[serde(default)]
    pub context: ArgumentContext,
}

/// Compact per-turn projection of the argument, used for routing and UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocalArgument {
    #[serde(default = "unspecified")]
    pub intent: String,
    #[serde(default = "unspecified")]
    pub subject: String,
    #[serde(default = "unspecified")]
    pub population: String,
    #[serde(default = "unspecified")]
    pub metrics: String,
    #[serde(default = "unspecified")]
    pub article_type: String,
}

fn unspecified() -> String {
    "não especificado".to_string()
}

impl Default for FocalArgument {
    fn default() -> Self {
        Self {
            intent: unspecified(),
            subject: unspecified(),
            population: unspecified(),
            metrics: unspecified(),
            article_type: unspecified(),
        }
    }
}

impl Proposition {
    /// Create an unevaluated proposition
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            solidity: None,
            evidence_refs: Vec::new(),
        }
    }

    /// Set the solidity grade, clamped to [0,1]
    pub fn with_solidity(mut self, solidity: f64) -> Self {
        self.solidity = Some(solidity.clamp(0.0, 1.0));
        self
    }

    /// Whether a solidity grade has been assigned
    pub fn is_evaluated(&self) -> bool {
        self.solidity.is_some()
    }

    /// Whether the proposition is well-supported (default threshold 0.6)
    pub fn is_solid(&self, threshold: f64) -> bool {
        self.solidity.is_some_and(|s| s >= threshold)
    }

    /// Whether the proposition is weakly supported (default threshold 0.4)
    pub fn is_fragile(&self, threshold: f64) -> bool {
        self.solidity.is_some_and(|s| s < threshold)
    }
}

impl CognitiveModel {
    /// Fallback model used when the LLM output is absent or malformed:
    /// the claim is the user input truncated to 200 characters and a single
    /// generic open question invites the user to elaborate.
    pub fn fallback(user_input: &str) -> Self {
        Self {
            claim: truncate_chars(user_input, CLAIM_FALLBACK_MAX_CHARS),
            propositions: Vec::new(),
            open_questions: vec![
                "O que exatamente você observou e em que contexto?".to_string(),
            ],
            contradictions: Vec::new(),
            solid_grounds: Vec::new(),
            context: ArgumentContext::default(),
        }
    }

    /// Drop contradictions below the confidence threshold. Persisted models
    /// only keep entries at or above 0.80 by default.
    pub fn retain_confident_contradictions(&mut self, threshold: f64) {
        self.contradictions.retain(|c| c.confidence >= threshold);
    }

    /// Aggregate maturity: mean solidity over evaluated propositions.
    /// Unevaluated propositions are excluded; returns `None` when nothing
    /// has been evaluated yet.
    pub fn maturity(&self) -> Option<f64> {
        let grades: Vec<f64> = self
            .propositions
            .iter()
            .chain(self.solid_grounds.iter())
            .filter_map(|p| p.solidity)
            .collect();

        if grades.is_empty() {
            None
        } else {
            Some(grades.iter().sum::<f64>() / grades.len() as f64)
        }
    }

    /// Assign ids to propositions the LLM returned without one and clamp
    /// out-of-range grades.
    pub fn normalize(&mut self) {
        for prop in self
            .propositions
            .iter_mut()
            .chain(self.solid_grounds.iter_mut())
        {
            if prop.id.is_empty() {
                prop.id = Uuid::new_v4().to_string();
            }
            if let Some(s) = prop.solidity {
                prop.solidity = Some(s.clamp(0.0, 1.0));
            }
        }
        for contradiction in &mut self.contradictions {
            contradiction.confidence = contradiction.confidence.clamp(0.0, 1.0);
        }
    }
}

/// Char-boundary-safe truncation
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
