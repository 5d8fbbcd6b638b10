//! Local Ollama backend.
//!
//! Needs no credential. Availability is a quick `GET /api/version` against the
//! configured host.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::{HttpTimeouts, build_http_client};

use super::{GenerationParams, ProviderError, RecommendationProvider, send_json};

const NAME: &str = "ollama";

/// Default local Ollama endpoint.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Ollama provider.
#[derive(Debug)]
pub struct OllamaProvider {
    host: String,
    model: String,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaProvider {
    /// Creates the provider for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Setup`] if the HTTP client cannot be built.
    pub fn new(host: &str, model: &str, timeouts: HttpTimeouts) -> Result<Self, ProviderError> {
        let client = build_http_client(timeouts)
            .map_err(|e| ProviderError::setup(NAME, format!("HTTP client construction failed: {e}")))?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            params: GenerationParams::default(),
            client,
        })
    }
}

#[async_trait]
impl RecommendationProvider for OllamaProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        60
    }

    fn setup_hint(&self) -> String {
        format!(
            "start Ollama at {} and run `ollama pull {}`",
            self.host, self.model
        )
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/api/version", self.host))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match probe {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(host = %self.host, error = %error, "ollama not reachable");
                false
            }
        }
    }

    #[tracing::instrument(skip(self, prompt), fields(provider = NAME, model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.params.temperature,
                num_predict: self.params.max_tokens,
            },
        };
        let request = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&body);
        let response: GenerateResponse = send_json(NAME, request).await?;

        if response.response.trim().is_empty() {
            return Err(ProviderError::malformed(NAME, "empty response"));
        }
        Ok(response.response)
    }
}
