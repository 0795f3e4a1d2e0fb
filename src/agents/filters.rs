//! Deterministic checkpoint filters (observer layer 2).
//!
//! The observer's LLM says whether the conversation deserves a user-facing
//! checkpoint; these business rules decide whether that signal survives.
//! New suppression rules belong here, not in the prompt.

use serde::{Deserialize, Serialize};

use super::observer::ChangeClass;
use crate::config::ObserverConfig;

/// Which filter decided the outcome.
///
/// Priority is strict and top-down: cold_start wins even when later filters
/// would also match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterApplied {
    ColdStart,
    HighClarity,
    VariationOnly,
    Cooldown,
    None,
}

impl std::fmt::Display for FilterApplied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterApplied::ColdStart => write!(f, "cold_start"),
            FilterApplied::HighClarity => write!(f, "high_clarity"),
            FilterApplied::VariationOnly => write!(f, "variation_only"),
            FilterApplied::Cooldown => write!(f, "cooldown"),
            FilterApplied::None => write!(f, "none"),
        }
    }
}

/// Outcome of the filter layer. Both the pre- and post-filter signal are
/// preserved for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDecision {
    pub needs_checkpoint: bool,
    pub filter_applied: FilterApplied,
    pub original_needs_checkpoint: bool,
    pub reason: String,
}

/// Apply the filters to the LLM's checkpoint signal.
///
/// A `false` signal passes through untouched; filters only ever suppress.
pub fn apply_filters(
    original_needs_checkpoint: bool,
    turn_number: u32,
    clarity_score: i32,
    classification: ChangeClass,
    turns_since_last_checkpoint: u32,
    config: &ObserverConfig,
) -> FilterDecision {
    if !original_needs_checkpoint {
        return FilterDecision {
            needs_checkpoint: false,
            filter_applied: FilterApplied::None,
            original_needs_checkpoint: false,
            reason: "observador não pediu checkpoint".to_string(),
        };
    }

    if turn_number <= config.min_turn_for_checkpoint {
        return suppressed(
            FilterApplied::ColdStart,
            format!(
                "turno {} ainda está no início da conversa (mínimo {})",
                turn_number, config.min_turn_for_checkpoint
            ),
        );
    }

    if clarity_score >= config.min_clarity_score_for_exemption {
        return suppressed(
            FilterApplied::HighClarity,
            format!(
                "clareza {} dispensa checkpoint (mínimo para isenção {})",
                clarity_score, config.min_clarity_score_for_exemption
            ),
        );
    }

    if classification == ChangeClass::Variation {
        return suppressed(
            FilterApplied::VariationOnly,
            "variação do mesmo conceito, sem mudança de direção".to_string(),
        );
    }

    if turns_since_last_checkpoint < config.min_turns_between_checkpoints {
        return suppressed(
            FilterApplied::Cooldown,
            format!(
                "último checkpoint há {} turnos (mínimo {})",
                turns_since_last_checkpoint, config.min_turns_between_checkpoints
            ),
        );
    }

    FilterDecision {
        needs_checkpoint: true,
        filter_applied: FilterApplied::None,
        original_needs_checkpoint: true,
        reason: "nenhum filtro suprimiu o checkpoint".to_string(),
    }
}

fn suppressed(filter: FilterApplied, reason: String) -> FilterDecision {
    FilterDecision {
        needs_checkpoint: false,
        filter_applied: filter,
        original_needs_checkpoint: true,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ObserverConfig {
        ObserverConfig::default()
    }

    #[test]
    fn test_false_signal_passes_through() {
        let decision = apply_filters(false, 5, 1, ChangeClass::RealChange, u32::MAX, &config());
        assert!(!decision.needs_checkpoint);
        assert!(!decision.original_needs_checkpoint);
        assert_eq!(decision.filter_applied, FilterApplied::None);
    }

    #[test]
    fn test_cold_start_suppresses_turn_one() {
        let decision = apply_filters(true, 1, 1, ChangeClass::RealChange, u32::MAX, &config());
        assert!(!decision.needs_checkpoint);
        assert!(decision.original_needs_checkpoint);
        assert_eq!(decision.filter_applied, FilterApplied::ColdStart);
    }

    #[test]
    fn test_cold_start_has_priority_over_every_other_filter() {
        // Turn 1 with conditions that would also match high_clarity,
        // variation_only and cooldown: cold_start must win.
        let decision = apply_filters(true, 1, 5, ChangeClass::Variation, 0, &config());
        assert_eq!(decision.filter_applied, FilterApplied::ColdStart);
    }

    #[test]
    fn test_high_clarity_suppresses() {
        let decision = apply_filters(true, 4, 4, ChangeClass::RealChange, u32::MAX, &config());
        assert!(!decision.needs_checkpoint);
        assert_eq!(decision.filter_applied, FilterApplied::HighClarity);
    }

    #[test]
    fn test_high_clarity_beats_variation_and_cooldown() {
        let decision = apply_filters(true, 4, 5, ChangeClass::Variation, 0, &config());
        assert_eq!(decision.filter_applied, FilterApplied::HighClarity);
    }

    #[test]
    fn test_variation_only_suppresses() {
        let decision = apply_filters(true, 4, 2, ChangeClass::Variation, u32::MAX, &config());
        assert!(!decision.needs_checkpoint);
        assert_eq!(decision.filter_applied, FilterApplied::VariationOnly);
    }

    #[test]
    fn test_cooldown_suppresses_recent_checkpoint() {
        let decision = apply_filters(true, 5, 2, ChangeClass::RealChange, 2, &config());
        assert!(!decision.needs_checkpoint);
        assert_eq!(decision.filter_applied, FilterApplied::Cooldown);
    }

    #[test]
    fn test_real_change_with_low_clarity_passes() {
        let decision = apply_filters(true, 2, 2, ChangeClass::RealChange, u32::MAX, &config());
        assert!(decision.needs_checkpoint);
        assert!(decision.original_needs_checkpoint);
        assert_eq!(decision.filter_applied, FilterApplied::None);
    }

    #[test]
    fn test_cooldown_boundary_is_strict() {
        // Exactly the minimum distance passes
        let decision = apply_filters(true, 6, 2, ChangeClass::RealChange, 3, &config());
        assert!(decision.needs_checkpoint);
    }

    #[test]
    fn test_filter_applied_serialization_names() {
        assert_eq!(
            serde_json::to_string(&FilterApplied::ColdStart).unwrap(),
            "\"cold_start\""
        );
        assert_eq!(
            serde_json::to_string(&FilterApplied::VariationOnly).unwrap(),
            "\"variation_only\""
        );
        assert_eq!(FilterApplied::HighClarity.to_string(), "high_clarity");
    }
}
