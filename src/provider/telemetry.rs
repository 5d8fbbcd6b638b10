//! Per-provider availability, outcome, latency and cost tracking.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Price per thousand tokens, in US dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenPricing {
    /// Price per 1000 prompt tokens.
    pub input_per_1k: f64,
    /// Price per 1000 completion tokens.
    pub output_per_1k: f64,
}

impl TokenPricing {
    /// Pricing for local or unpriced models.
    pub const FREE: Self = Self {
        input_per_1k: 0.0,
        output_per_1k: 0.0,
    };

    /// Looks up published pricing for a model name.
    ///
    /// Unknown models are treated as free, so cost totals are lower bounds.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        let (input_per_1k, output_per_1k) = if model.starts_with("gpt-4") {
            (0.03, 0.06)
        } else if model.starts_with("gpt-3.5-turbo") || model.starts_with("command") {
            (0.0015, 0.002)
        } else if model.contains("llama-2") || model.contains("mixtral-8x7b") {
            (0.0007, 0.0007)
        } else {
            return Self::FREE;
        };
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Estimates the cost of one call.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Estimates the token count of `text` as one token per four characters.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Snapshot of one provider's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStatus {
    /// Result of the last availability check, if one has run.
    pub available: Option<bool>,
    /// Calls attempted (one per orchestrator turn, not per retry).
    pub attempts: u64,
    /// Calls that produced recommendations.
    pub successes: u64,
    /// Calls that failed or produced nothing usable.
    pub failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Latency of the most recent completed call, in milliseconds.
    pub last_latency_ms: Option<u64>,
    /// Accumulated estimated cost in US dollars.
    pub estimated_cost_usd: f64,
}

/// Concurrent telemetry store keyed by provider name.
#[derive(Debug, Default)]
pub struct ProviderTelemetry {
    statuses: DashMap<String, ProviderStatus>,
}

impl ProviderTelemetry {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of an availability check.
    pub fn record_availability(&self, provider: &str, available: bool) {
        self.statuses.entry(provider.to_string()).or_default().available = Some(available);
    }

    /// Records that a call is starting.
    pub fn record_attempt(&self, provider: &str) {
        self.statuses.entry(provider.to_string()).or_default().attempts += 1;
    }

    /// Records a successful call.
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_success(&self, provider: &str, latency: Duration, cost_usd: f64) {
        let mut status = self.statuses.entry(provider.to_string()).or_default();
        status.successes += 1;
        status.last_latency_ms = Some(latency.as_millis() as u64);
        status.estimated_cost_usd += cost_usd;
    }

    /// Records a failed call.
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_failure(&self, provider: &str, latency: Duration, error: &str) {
        let mut status = self.statuses.entry(provider.to_string()).or_default();
        status.failures += 1;
        status.last_latency_ms = Some(latency.as_millis() as u64);
        status.last_error = Some(error.to_string());
    }

    /// Adds cost for a call whose output was not usable but was still billed.
    pub fn record_cost(&self, provider: &str, cost_usd: f64) {
        self.statuses
            .entry(provider.to_string())
            .or_default()
            .estimated_cost_usd += cost_usd;
    }

    /// Returns a snapshot for one provider.
    #[must_use]
    pub fn status(&self, provider: &str) -> Option<ProviderStatus> {
        self.statuses.get(provider).map(|status| status.clone())
    }

    /// Returns the total estimated cost across providers.
    #[must_use]
    pub fn total_cost_usd(&self) -> f64 {
        self.statuses
            .iter()
            .map(|entry| entry.value().estimated_cost_usd)
            .sum()
    }
}
