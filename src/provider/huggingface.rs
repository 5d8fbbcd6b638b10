//! Hugging Face inference API backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http_client::{HttpTimeouts, build_http_client};

use super::{
    GenerationParams, ProviderError, RecommendationProvider, TokenPricing, require_key, send_json,
};

const NAME: &str = "huggingface";
const ENV_VAR: &str = "HUGGINGFACE_API_KEY";
const BASE_URL: &str = "https://api-inference.huggingface.co";

/// Hugging Face text-generation provider.
#[derive(Debug)]
pub struct HuggingFaceProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: String,
}

impl HuggingFaceProvider {
    /// Creates the provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Setup`] if the HTTP client cannot be built.
    pub fn new(
        api_key: Option<String>,
        model: &str,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        let client = build_http_client(timeouts)
            .map_err(|e| ProviderError::setup(NAME, format!("HTTP client construction failed: {e}")))?;
        Ok(Self {
            base_url: BASE_URL.to_string(),
            api_key,
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

#[async_trait]
impl RecommendationProvider for HuggingFaceProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        50
    }

    fn setup_hint(&self) -> String {
        format!("set {ENV_VAR} to enable {NAME}")
    }

    fn pricing(&self) -> TokenPricing {
        TokenPricing::for_model(&self.model)
    }

    async fn is_available(&self) -> bool {
        require_key(NAME, ENV_VAR, self.api_key.as_deref()).is_ok()
    }

    #[tracing::instrument(skip(self, prompt), fields(provider = NAME, model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let key = require_key(NAME, ENV_VAR, self.api_key.as_deref())?;
        let body = InferenceRequest {
            inputs: prompt,
            parameters: InferenceParameters {
                max_new_tokens: self.params.max_tokens,
                temperature: self.params.temperature,
                return_full_text: false,
            },
        };

        // A cold model answers 503 with an estimated load time; the status
        // classifies as transient, so the retry loop waits it out.
        let request = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(key)
            .json(&body);
        let generations: Vec<Generation> = send_json(NAME, request).await?;

        generations
            .into_iter()
            .map(|generation| generation.generated_text)
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed(NAME, "no generated text in response"))
    }
}
