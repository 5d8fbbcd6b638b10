//! Recommendation providers and the fallback orchestrator.
//!
//! # Architecture
//!
//! - [`RecommendationProvider`] - Async trait each language-model backend implements
//! - [`ProviderOrchestrator`] - Priority-ordered fallback loop with caching and telemetry
//! - [`ProviderTelemetry`] - Per-provider availability, latency and cost counters
//! - [`OpenAiChatProvider`] - OpenAI chat completions (also serves Perplexity)
//! - [`CohereProvider`], [`ReplicateProvider`], [`HuggingFaceProvider`] - Hosted backends
//! - [`OllamaProvider`] - Local backend, no credential required
//!
//! # Example
//!
//! ```no_run
//! use mixhound_core::Configuration;
//! use mixhound_core::provider::build_default_orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::default();
//! let orchestrator = build_default_orchestrator(&config, None);
//! let candidates = orchestrator.recommend("rainy sunday folk").await?;
//! for candidate in candidates {
//!     println!("{candidate}");
//! }
//! # Ok(())
//! # }
//! ```

mod cohere;
mod error;
mod huggingface;
mod ollama;
mod openai;
mod orchestrator;
mod prompt;
mod replicate;
mod telemetry;

pub use cohere::CohereProvider;
pub use error::{ProviderAttempt, ProviderError, RecommendError};
pub use huggingface::HuggingFaceProvider;
pub use ollama::{DEFAULT_OLLAMA_HOST, OllamaProvider};
pub use openai::OpenAiChatProvider;
pub use orchestrator::{FallbackState, ProviderDescriptor, ProviderOrchestrator};
pub use prompt::{mood_prompt, recommendation_prompt, split_mood_labels};
pub use replicate::ReplicateProvider;
pub use telemetry::{ProviderStatus, ProviderTelemetry, TokenPricing, estimate_tokens};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::cache::Cache;
use crate::config::Configuration;
use crate::retry::RetryPolicy;

/// Sampling parameters shared by hosted backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

/// Trait that every recommendation backend implements.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Box<dyn RecommendationProvider>`, which the orchestrator's fallback loop
/// requires.
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// Returns the provider's name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Returns the provider's priority. Lower values are tried first.
    fn priority(&self) -> u8;

    /// Returns an actionable message describing how to make this provider usable.
    fn setup_hint(&self) -> String;

    /// Returns the per-token pricing used for cost estimates.
    fn pricing(&self) -> TokenPricing {
        TokenPricing::FREE
    }

    /// Returns the retry policy applied around each call.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::api()
    }

    /// Returns true if the provider can be called right now.
    async fn is_available(&self) -> bool;

    /// Sends a prompt and returns the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Produces free-text song recommendations for a prepared prompt.
    async fn generate_query(&self, prompt: &str) -> Result<String, ProviderError> {
        self.complete(prompt).await
    }

    /// Returns short mood labels describing `text`.
    async fn analyze_mood(&self, text: &str) -> Result<Vec<String>, ProviderError> {
        let raw = self.complete(&mood_prompt(text)).await?;
        Ok(split_mood_labels(&raw))
    }
}

/// Builds the default orchestrator from configuration.
///
/// Hosted providers are registered even without a credential so that
/// `providers` output and setup hints can name them; they report unavailable
/// until the credential is set.
#[must_use]
pub fn build_default_orchestrator(
    config: &Configuration,
    cache: Option<Arc<Cache>>,
) -> ProviderOrchestrator {
    let mut orchestrator = ProviderOrchestrator::new();
    if let Some(cache) = cache {
        orchestrator = orchestrator.with_cache(cache);
    }
    let timeouts = config.http_timeouts;
    let models = &config.models;

    match OpenAiChatProvider::openai(config.credentials.openai.clone(), &models.openai, timeouts) {
        Ok(provider) => orchestrator.register(Box::new(provider)),
        Err(error) => warn!(error = %error, "OpenAI provider unavailable; continuing"),
    }

    match OpenAiChatProvider::perplexity(
        config.credentials.perplexity.clone(),
        &models.perplexity,
        timeouts,
    ) {
        Ok(provider) => orchestrator.register(Box::new(provider)),
        Err(error) => warn!(error = %error, "Perplexity provider unavailable; continuing"),
    }

    match CohereProvider::new(config.credentials.cohere.clone(), &models.cohere, timeouts) {
        Ok(provider) => orchestrator.register(Box::new(provider)),
        Err(error) => warn!(error = %error, "Cohere provider unavailable; continuing"),
    }

    match ReplicateProvider::new(
        config.credentials.replicate.clone(),
        &models.replicate,
        timeouts,
    ) {
        Ok(provider) => orchestrator.register(Box::new(provider)),
        Err(error) => warn!(error = %error, "Replicate provider unavailable; continuing"),
    }

    match HuggingFaceProvider::new(
        config.credentials.huggingface.clone(),
        &models.huggingface,
        timeouts,
    ) {
        Ok(provider) => orchestrator.register(Box::new(provider)),
        Err(error) => warn!(error = %error, "HuggingFace provider unavailable; continuing"),
    }

    match OllamaProvider::new(&config.ollama_host, &models.ollama, timeouts) {
        Ok(provider) => orchestrator.register(Box::new(provider)),
        Err(error) => warn!(error = %error, "Ollama provider unavailable; continuing"),
    }

    orchestrator
}

/// Sends a request and decodes a JSON body, mapping failures to [`ProviderError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::request(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::http_status(provider, status.as_u16(), &body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::request(provider, &e))?;
    serde_json::from_str(&body).map_err(|e| ProviderError::malformed(provider, e.to_string()))
}

/// Returns the credential if it is present and non-blank.
pub(crate) fn require_key<'a>(
    provider: &str,
    env_var: &str,
    key: Option<&'a str>,
) -> Result<&'a str, ProviderError> {
    key.map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ProviderError::missing_credential(provider, env_var))
}
