//! Error types for recommendation providers.
//!
//! Messages follow the What/Why/Fix layout used across the project.

use thiserror::Error;

use crate::retry::{Classify, ErrorKind, classify_http_status, classify_reqwest_error};

/// Errors raised by a single provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider needs a credential that is not configured.
    #[error("{provider} is not configured: {env_var} is not set\n  Suggestion: Export {env_var} or add it to the config file")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Environment variable that supplies the credential.
        env_var: String,
    },

    /// The service answered with a non-success status.
    #[error("{provider} returned HTTP {status}: {detail}\n  Suggestion: {suggestion}")]
    HttpStatus {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        detail: String,
        /// How to fix the issue.
        suggestion: String,
    },

    /// The request did not complete.
    #[error("{provider} request failed: {message}\n  Suggestion: Check your network connection")]
    Network {
        /// Provider name.
        provider: String,
        /// Classified failure kind.
        kind: ErrorKind,
        /// Underlying error text.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("{provider} returned an unreadable response: {detail}")]
    Malformed {
        /// Provider name.
        provider: String,
        /// What was wrong with it.
        detail: String,
    },

    /// The provider could not be constructed.
    #[error("{provider} could not be initialized: {reason}")]
    Setup {
        /// Provider name.
        provider: String,
        /// Why construction failed.
        reason: String,
    },
}

/// Maximum response-body characters kept in error messages.
const DETAIL_MAX_CHARS: usize = 200;

impl ProviderError {
    /// Creates a `MissingCredential` error.
    #[must_use]
    pub fn missing_credential(provider: &str, env_var: &str) -> Self {
        Self::MissingCredential {
            provider: provider.to_string(),
            env_var: env_var.to_string(),
        }
    }

    /// Creates an `HttpStatus` error with a status-appropriate suggestion.
    #[must_use]
    pub fn http_status(provider: &str, status: u16, body: &str) -> Self {
        let suggestion = match classify_http_status(status) {
            ErrorKind::QuotaOrAuth => "Check the API key and remaining quota for this provider",
            ErrorKind::RateLimited => "Wait a moment before trying again",
            ErrorKind::TransientNetwork => "The service may be temporarily unavailable; try again later",
            _ => "Check the configured model name and request parameters",
        };
        Self::HttpStatus {
            provider: provider.to_string(),
            status,
            detail: truncate_detail(body),
            suggestion: suggestion.to_string(),
        }
    }

    /// Creates a `Network` error from a reqwest failure.
    #[must_use]
    pub fn request(provider: &str, error: &reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::http_status(provider, status.as_u16(), "");
        }
        Self::Network {
            provider: provider.to_string(),
            kind: classify_reqwest_error(error),
            message: error.to_string(),
        }
    }

    /// Creates a `Malformed` error.
    #[must_use]
    pub fn malformed(provider: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }

    /// Creates a `Setup` error.
    #[must_use]
    pub fn setup(provider: &str, reason: impl Into<String>) -> Self {
        Self::Setup {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }
}

impl Classify for ProviderError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential { .. } => ErrorKind::QuotaOrAuth,
            Self::HttpStatus { status, .. } => classify_http_status(*status),
            Self::Network { kind, .. } => *kind,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Setup { .. } => ErrorKind::Permanent,
        }
    }
}

/// A provider that was tried and did not produce recommendations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    /// Provider name.
    pub provider: String,
    /// Why it did not produce a result.
    pub reason: String,
}

/// Errors returned by the provider orchestrator.
#[derive(Debug, Clone, Error)]
pub enum RecommendError {
    /// No registered provider is usable right now.
    #[error("no recommendation provider is available\n  Suggestion: {}", .hints.join("; "))]
    NoProviderAvailable {
        /// One setup hint per registered provider.
        hints: Vec<String>,
    },

    /// Every available provider was tried and none produced a result.
    #[error("all {} recommendation provider(s) failed: {}", .attempts.len(), format_attempts(.attempts))]
    AllProvidersFailed {
        /// One entry per provider tried, in order.
        attempts: Vec<ProviderAttempt>,
    },
}

fn format_attempts(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{} ({})", attempt.provider, attempt.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= DETAIL_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut detail: String = trimmed.chars().take(DETAIL_MAX_CHARS).collect();
    detail.push('…');
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_message_names_env_var() {
        let error = ProviderError::missing_credential("openai", "OPENAI_API_KEY");
        let message = error.to_string();
        assert!(message.contains("OPENAI_API_KEY"));
        assert!(message.contains("Suggestion:"));
        assert_eq!(error.kind(), ErrorKind::QuotaOrAuth);
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(
            ProviderError::http_status("cohere", 401, "").kind(),
            ErrorKind::QuotaOrAuth
        );
        assert_eq!(
            ProviderError::http_status("cohere", 503, "").kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            ProviderError::http_status("cohere", 429, "").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            ProviderError::http_status("cohere", 404, "").kind(),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(500);
        let ProviderError::HttpStatus { detail, .. } = ProviderError::http_status("p", 500, &body)
        else {
            panic!("expected HttpStatus");
        };
        assert_eq!(detail.chars().count(), DETAIL_MAX_CHARS + 1);
    }

    #[test]
    fn test_all_failed_lists_each_provider() {
        let error = RecommendError::AllProvidersFailed {
            attempts: vec![
                ProviderAttempt {
                    provider: "openai".to_string(),
                    reason: "HTTP 500".to_string(),
                },
                ProviderAttempt {
                    provider: "ollama".to_string(),
                    reason: "no songs".to_string(),
                },
            ],
        };
        let message = error.to_string();
        assert!(message.contains("all 2 recommendation provider(s) failed"));
        assert!(message.contains("openai (HTTP 500)"));
        assert!(message.contains("ollama (no songs)"));
    }

    #[test]
    fn test_no_provider_available_joins_hints() {
        let error = RecommendError::NoProviderAvailable {
            hints: vec!["set OPENAI_API_KEY".to_string(), "start ollama".to_string()],
        };
        assert!(error.to_string().contains("set OPENAI_API_KEY; start ollama"));
    }
}
