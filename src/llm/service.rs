use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tracing::{error, info, warn};

use super::pricing;
use super::types::{ChatMessage, LlmResponse};
use super::{AnthropicProvider, LlmProvider, MaritacaProvider};
use crate::config::{Config, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Consecutive-failure counters per provider, shared process-wide so every
/// service instance (and every conversation thread) sees the same breaker
/// state. A slightly stale count under concurrent updates is acceptable.
static BREAKERS: Lazy<Mutex<HashMap<String, u32>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Result of one invocation: the response plus extracted telemetry
#[derive(Debug, Clone)]
pub struct LlmOutcome {
    pub response: LlmResponse,
    pub tokens_input: u32,
    pub tokens_output: u32,
    /// USD cost per the model price table; zero for unpriced models.
    pub cost: f64,
}

/// Provider-polymorphic LLM invocation service.
///
/// Dispatches on model-name prefix, retries with exponential backoff and
/// fails fast while a provider circuit is open.
#[derive(Clone)]
pub struct LlmService {
    routes: Vec<(String, Arc<dyn LlmProvider>)>,
    request: RequestConfig,
}

impl LlmService {
    /// Build a service with routes for every provider that has credentials
    pub fn from_config(config: &Config) -> LlmResult<Self> {
        let mut routes: Vec<(String, Arc<dyn LlmProvider>)> = Vec::new();

        if let Some(key) = &config.llm.anthropic_api_key {
            let provider = AnthropicProvider::new(
                key.clone(),
                &config.llm.anthropic_base_url,
                config.request.timeout_ms,
            )?;
            routes.push(("claude".to_string(), Arc::new(provider)));
        }

        if let Some(key) = &config.llm.maritaca_api_key {
            let provider = MaritacaProvider::new(
                key.clone(),
                &config.llm.maritaca_base_url,
                config.request.timeout_ms,
            )?;
            routes.push(("sabia".to_string(), Arc::new(provider)));
        }

        Ok(Self {
            routes,
            request: config.request.clone(),
        })
    }

    /// Build a service from explicit routes. Used by tests and by callers
    /// that plug in additional providers.
    pub fn with_routes(
        routes: Vec<(String, Arc<dyn LlmProvider>)>,
        request: RequestConfig,
    ) -> Self {
        Self { routes, request }
    }

    /// Invoke a model with retry, circuit breaking and cost extraction.
    ///
    /// `agent_name` identifies the calling agent in logs and has no effect
    /// on routing.
    pub async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        agent_name: &str,
    ) -> LlmResult<LlmOutcome> {
        let provider = self.resolve(model)?;
        let provider_name = provider.name();

        if self.breaker_is_open(provider_name) {
            warn!(
                provider = %provider_name,
                agent = %agent_name,
                "Circuit open, failing fast"
            );
            return Err(LlmError::CircuitOpen {
                provider: provider_name.to_string(),
            });
        }

        let mut last_error = None;

        for attempt in 1..=self.request.max_attempts {
            if attempt > 1 {
                let delay = Duration::from_secs(
                    self.request.backoff_base_secs * 2_u64.pow(attempt - 2),
                );
                warn!(
                    provider = %provider_name,
                    agent = %agent_name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying LLM request"
                );
                tokio::time::sleep(delay).await;

                // The breaker may have been opened by failures on other
                // threads while this one was backing off.
                if self.breaker_is_open(provider_name) {
                    return Err(LlmError::CircuitOpen {
                        provider: provider_name.to_string(),
                    });
                }
            }

            let start = Instant::now();

            match provider.complete(model, messages, agent_name).await {
                Ok(response) => {
                    self.breaker_record(provider_name, true);

                    let tokens_input = response.usage.input_tokens;
                    let tokens_output = response.usage.output_tokens;
                    let cost = pricing::cost_usd(model, tokens_input, tokens_output);
                    if pricing::price_for(model).is_none() {
                        warn!(model = %model, "Model missing from price table, cost recorded as zero");
                    }

                    info!(
                        provider = %provider_name,
                        agent = %agent_name,
                        model = %model,
                        latency_ms = start.elapsed().as_millis() as u64,
                        tokens_input,
                        tokens_output,
                        "LLM call succeeded"
                    );

                    return Ok(LlmOutcome {
                        response,
                        tokens_input,
                        tokens_output,
                        cost,
                    });
                }
                Err(e) => {
                    self.breaker_record(provider_name, false);
                    error!(
                        provider = %provider_name,
                        agent = %agent_name,
                        model = %model,
                        error = %e,
                        attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "LLM call failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            attempts: self.request.max_attempts,
        })
    }

    /// Longest matching prefix wins, so a catch-all `""` route can coexist
    /// with specific ones.
    fn resolve(&self, model: &str) -> LlmResult<Arc<dyn LlmProvider>> {
        self.routes
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, provider)| Arc::clone(provider))
            .ok_or_else(|| LlmError::UnknownModel {
                model: model.to_string(),
            })
    }

    fn breaker_is_open(&self, provider: &str) -> bool {
        let breakers = BREAKERS.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .get(provider)
            .is_some_and(|failures| *failures >= self.request.breaker_failure_threshold)
    }

    fn breaker_record(&self, provider: &str, success: bool) {
        let mut breakers = BREAKERS.lock().unwrap_or_else(|e| e.into_inner());
        let counter = breakers.entry(provider.to_string()).or_insert(0);
        if success {
            if *counter >= self.request.breaker_failure_threshold {
                info!(provider = %provider, "Circuit closed after success");
            }
            *counter = 0;
        } else {
            *counter += 1;
            if *counter == self.request.breaker_failure_threshold {
                warn!(
                    provider = %provider,
                    failures = *counter,
                    "Circuit opened"
                );
            }
        }
    }
}
