//! Replicate predictions backend.
//!
//! Uses the synchronous `Prefer: wait` mode; a prediction that is still
//! running when the server answers is treated as a transient failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http_client::{HttpTimeouts, build_http_client};
use crate::retry::ErrorKind;

use super::{
    GenerationParams, ProviderError, RecommendationProvider, TokenPricing, require_key, send_json,
};

const NAME: &str = "replicate";
const ENV_VAR: &str = "REPLICATE_API_TOKEN";
const BASE_URL: &str = "https://api.replicate.com/v1";

/// Replicate read timeout (predictions are slow to start).
pub const REPLICATE_READ_TIMEOUT_SECS: u64 = 60;

/// Replicate model provider.
#[derive(Debug)]
pub struct ReplicateProvider {
    base_url: String,
    api_token: Option<String>,
    model: String,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<String>,
}

impl ReplicateProvider {
    /// Creates the provider with the longer Replicate read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Setup`] if the HTTP client cannot be built.
    pub fn new(
        api_token: Option<String>,
        model: &str,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        let timeouts = timeouts.with_read_timeout_secs(
            timeouts.read_timeout_secs.max(REPLICATE_READ_TIMEOUT_SECS),
        );
        let client = build_http_client(timeouts)
            .map_err(|e| ProviderError::setup(NAME, format!("HTTP client construction failed: {e}")))?;
        Ok(Self {
            base_url: BASE_URL.to_string(),
            api_token,
            model: model.to_string(),
            params: GenerationParams::default(),
            client,
        })
    }

    /// Points the provider at a different API root (for tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Flattens prediction output, which is either a string or a list of chunks.
fn output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        Value::Array(chunks) => chunks.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

#[async_trait]
impl RecommendationProvider for ReplicateProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        40
    }

    fn setup_hint(&self) -> String {
        format!("set {ENV_VAR} to enable {NAME}")
    }

    fn pricing(&self) -> TokenPricing {
        TokenPricing::for_model(&self.model)
    }

    async fn is_available(&self) -> bool {
        require_key(NAME, ENV_VAR, self.api_token.as_deref()).is_ok()
    }

    #[tracing::instrument(skip(self, prompt), fields(provider = NAME, model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let token = require_key(NAME, ENV_VAR, self.api_token.as_deref())?;
        let body = PredictionRequest {
            input: PredictionInput {
                prompt,
                max_new_tokens: self.params.max_tokens,
                temperature: self.params.temperature,
            },
        };

        let request = self
            .client
            .post(format!("{}/models/{}/predictions", self.base_url, self.model))
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body);
        let prediction: Prediction = send_json(NAME, request).await?;

        match prediction.status.as_str() {
            "succeeded" => {
                let text = output_text(&prediction.output);
                if text.trim().is_empty() {
                    return Err(ProviderError::malformed(NAME, "prediction produced no output"));
                }
                Ok(text)
            }
            "failed" | "canceled" => Err(ProviderError::malformed(
                NAME,
                prediction
                    .error
                    .unwrap_or_else(|| format!("prediction {}", prediction.status)),
            )),
            other => Err(ProviderError::Network {
                provider: NAME.to_string(),
                kind: ErrorKind::TransientNetwork,
                message: format!("prediction still {other}"),
            }),
        }
    }
}
