use crate::config::{Currency, TelemetryConfig};

/// USD prices per million tokens for one model family
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Longest-prefix price table. Models missing from the table cost zero;
/// the invocation service logs a warning when that happens.
const PRICE_TABLE: &[(&str, ModelPrice)] = &[
    (
        "claude-3-5-sonnet",
        ModelPrice {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
    ),
    (
        "claude-3-5-haiku",
        ModelPrice {
            input_per_million: 0.80,
            output_per_million: 4.00,
        },
    ),
    (
        "claude-3-haiku",
        ModelPrice {
            input_per_million: 0.25,
            output_per_million: 1.25,
        },
    ),
    (
        "claude-3-opus",
        ModelPrice {
            input_per_million: 15.00,
            output_per_million: 75.00,
        },
    ),
    (
        "sabia-3",
        ModelPrice {
            input_per_million: 0.95,
            output_per_million: 1.90,
        },
    ),
    (
        "sabiazinho",
        ModelPrice {
            input_per_million: 0.20,
            output_per_million: 0.60,
        },
    ),
];

/// Look up the price entry for a model name
pub fn price_for(model: &str) -> Option<ModelPrice> {
    PRICE_TABLE
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, price)| *price)
}

/// Cost in USD for a call with the given token counts.
/// Unknown models cost zero.
pub fn cost_usd(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    match price_for(model) {
        Some(price) => {
            (input_tokens as f64 / 1_000_000.0) * price.input_per_million
                + (output_tokens as f64 / 1_000_000.0) * price.output_per_million
        }
        None => 0.0,
    }
}

/// Format a USD cost in the configured display currency
pub fn display_cost(cost_usd: f64, telemetry: &TelemetryConfig) -> String {
    match telemetry.currency {
        Currency::Usd => format!("US$ {:.6}", cost_usd),
        Currency::Brl => format!("R$ {:.6}", cost_usd * telemetry.usd_to_brl_rate),
    }
}
