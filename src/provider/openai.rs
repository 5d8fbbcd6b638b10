//! OpenAI-compatible chat completions backend.
//!
//! Perplexity exposes the same wire format at a different host, so both
//! providers share this implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::{HttpTimeouts, build_http_client};

use super::{
    GenerationParams, ProviderError, RecommendationProvider, TokenPricing, require_key, send_json,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

const SYSTEM_PROMPT: &str =
    "You are a music curator. You only recommend songs that really exist.";

/// Chat completions provider for OpenAI and Perplexity.
#[derive(Debug)]
pub struct OpenAiChatProvider {
    name: &'static str,
    priority: u8,
    env_var: &'static str,
    base_url: String,
    api_key: Option<String>,
    model: String,
    params: GenerationParams,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatProvider {
    /// Creates the OpenAI provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Setup`] if the HTTP client cannot be built.
    pub fn openai(
        api_key: Option<String>,
        model: &str,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        Self::build("openai", 10, "OPENAI_API_KEY", OPENAI_BASE_URL, api_key, model, timeouts)
    }

    /// Creates the Perplexity provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Setup`] if the HTTP client cannot be built.
    pub fn perplexity(
        api_key: Option<String>,
        model: &str,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        Self::build(
            "perplexity",
            20,
            "PERPLEXITY_API_KEY",
            PERPLEXITY_BASE_URL,
            api_key,
            model,
            timeouts,
        )
    }

    /// Points the provider at a different API root (for tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Overrides the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    fn build(
        name: &'static str,
        priority: u8,
        env_var: &'static str,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ProviderError> {
        let client = build_http_client(timeouts)
            .map_err(|e| ProviderError::setup(name, format!("HTTP client construction failed: {e}")))?;
        Ok(Self {
            name,
            priority,
            env_var,
            base_url: base_url.to_string(),
            api_key,
            model: model.to_string(),
            params: GenerationParams::default(),
            client,
        })
    }
}

#[async_trait]
impl RecommendationProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn setup_hint(&self) -> String {
        format!("set {} to enable {}", self.env_var, self.name)
    }

    fn pricing(&self) -> TokenPricing {
        TokenPricing::for_model(&self.model)
    }

    async fn is_available(&self) -> bool {
        require_key(self.name, self.env_var, self.api_key.as_deref()).is_ok()
    }

    #[tracing::instrument(skip(self, prompt), fields(provider = self.name, model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let key = require_key(self.name, self.env_var, self.api_key.as_deref())?;
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
        };

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&body);
        let response: ChatResponse = send_json(self.name, request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed(self.name, "response has no message content"))?;

        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }
}
