//! Error types for search resolution.

use thiserror::Error;

use crate::retry::{Classify, ErrorKind, classify_http_status, classify_reqwest_error};

/// Errors raised by a search tier.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The structured search API has no credential.
    #[error("{source_name} is not configured: {env_var} is not set\n  Suggestion: Export {env_var} to enable API search")]
    MissingCredential {
        /// Search source name.
        source_name: String,
        /// Environment variable that supplies the credential.
        env_var: String,
    },

    /// The search service answered with a non-success status.
    #[error("{source_name} returned HTTP {status}: {detail}")]
    HttpStatus {
        /// Search source name.
        source_name: String,
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        detail: String,
    },

    /// The request did not complete.
    #[error("{source_name} request failed: {message}\n  Suggestion: Check your network connection")]
    Network {
        /// Search source name.
        source_name: String,
        /// Classified failure kind.
        kind: ErrorKind,
        /// Underlying error text.
        message: String,
    },

    /// The response could not be decoded.
    #[error("{source_name} returned an unreadable response: {detail}")]
    Malformed {
        /// Search source name.
        source_name: String,
        /// What was wrong with it.
        detail: String,
    },

    /// The extractor binary is not installed.
    #[error("{tool} was not found on PATH\n  Suggestion: Install {tool} (e.g. `pipx install {tool}`) or set its path in the config file")]
    ToolMissing {
        /// Binary name.
        tool: String,
    },

    /// The extractor ran but failed.
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        /// Binary name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Last line of standard error.
        stderr: String,
    },
}

impl SearchError {
    /// Creates an `HttpStatus` error.
    #[must_use]
    pub fn http_status(source_name: &str, status: u16, body: &str) -> Self {
        Self::HttpStatus {
            source_name: source_name.to_string(),
            status,
            detail: body.trim().chars().take(200).collect(),
        }
    }

    /// Creates a `Network` error from a reqwest failure.
    #[must_use]
    pub fn request(source_name: &str, error: &reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::http_status(source_name, status.as_u16(), "");
        }
        Self::Network {
            source_name: source_name.to_string(),
            kind: classify_reqwest_error(error),
            message: error.to_string(),
        }
    }

    /// Creates a `Malformed` error.
    #[must_use]
    pub fn malformed(source_name: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            source_name: source_name.to_string(),
            detail: detail.into(),
        }
    }
}

impl Classify for SearchError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential { .. } => ErrorKind::QuotaOrAuth,
            Self::HttpStatus { status, .. } => classify_http_status(*status),
            Self::Network { kind, .. } => *kind,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::ToolMissing { .. } => ErrorKind::Permanent,
            Self::ToolFailed { .. } => ErrorKind::TransientNetwork,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_is_quota_or_auth() {
        let error = SearchError::http_status("youtube-api", 403, "quotaExceeded");
        assert_eq!(error.kind(), ErrorKind::QuotaOrAuth);
        assert!(error.to_string().contains("quotaExceeded"));
    }

    #[test]
    fn test_tool_missing_is_permanent_with_suggestion() {
        let error = SearchError::ToolMissing {
            tool: "yt-dlp".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Permanent);
        assert!(error.to_string().contains("Suggestion: Install yt-dlp"));
    }

    #[test]
    fn test_tool_failure_is_retryable() {
        let error = SearchError::ToolFailed {
            tool: "yt-dlp".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "HTTP Error 503".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::TransientNetwork);
    }
}
