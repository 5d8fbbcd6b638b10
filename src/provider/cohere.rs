//! Cohere chat backend (v2 API).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http_client::{HttpTimeouts, build_http_client};

use super::{
    GenerationParams, ProviderError, RecommendationProvider, TokenPricing, require_key, send_json,
};

const NAME: &str = "cohere";
const ENV_VAR: &str = "COHERE_API_KEY";
const BASE_URL: &str = "https://api.cohere.com";

/// Cohere chat provider.
#[derive(Debug)]
pub struct CohereProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    messages: [CohereMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CohereMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    message: CohereResponseMessage,
}

#[derive(Debug, Deserialize)]
struct CohereResponseMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
}

#[derive(Debug, Deserialize)]
struct CohereContent {
    #[serde(default)]
    text: String,
}

impl CohereProvider {
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
impl RecommendationProvider for CohereProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        30
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
        let body = CohereRequest {
            model: &self.model,
            messages: [CohereMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
        };

        let request = self
            .client
            .post(format!("{}/v2/chat", self.base_url))
            .bearer_auth(key)
            .json(&body);
        let response: CohereResponse = send_json(NAME, request).await?;

        let text: String = response
            .message
            .content
            .into_iter()
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(ProviderError::malformed(NAME, "response has no text content"));
        }
        Ok(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retry::{Classify, ErrorKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_complete_joins_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": [
                    {"type": "text", "text": "Hurt by "},
                    {"type": "text", "text": "Johnny Cash"}
                ]}
            })))
            .mount(&server)
            .await;

        let provider = CohereProvider::new(Some("k".into()), "command-r", HttpTimeouts::default())
            .unwrap()
            .with_base_url(&server.uri());
        assert_eq!(provider.complete("p").await.unwrap(), "Hurt by Johnny Cash");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/chat"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider = CohereProvider::new(Some("k".into()), "command-r", HttpTimeouts::default())
            .unwrap()
            .with_base_url(&server.uri());
        let error = provider.complete("p").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransientNetwork);
    }
}
