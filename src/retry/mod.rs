//! Retry logic with exponential backoff for every network-bound call.
//!
//! This module provides the [`RetryPolicy`] presets, the [`ErrorKind`]
//! classification shared by all error types that flow through retries, and the
//! [`RetryExecutor`] that drives the attempt loop.
//!
//! # Overview
//!
//! When an operation fails, its error is classified into an [`ErrorKind`]:
//! - [`ErrorKind::TransientNetwork`] - Temporary failures that may succeed on retry
//! - [`ErrorKind::RateLimited`] - Server rate limiting (retries with backoff)
//! - [`ErrorKind::QuotaOrAuth`] - Credential or quota problems; the capability should be
//!   marked unavailable instead of retried
//! - [`ErrorKind::Malformed`] - The service answered with something we cannot read
//! - [`ErrorKind::Permanent`] - Failures that won't succeed regardless of retries
//!
//! The policy lists which kinds are retryable; everything else propagates on
//! the first occurrence.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mixhound_core::retry::{ErrorKind, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::api();
//! match policy.should_retry(ErrorKind::TransientNetwork, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(1));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

mod executor;
mod policy;

pub use executor::{RetryError, RetryExecutor};
pub use policy::{RetryDecision, RetryPolicy};

/// Classification of failures for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: connection refused, timeout, 5xx server errors.
    TransientNetwork,

    /// Server rate limiting (HTTP 429).
    RateLimited,

    /// Missing/invalid credential or exhausted quota.
    ///
    /// Never retried; signals that the capability should be marked unavailable.
    QuotaOrAuth,

    /// The response could not be decoded into the expected shape.
    Malformed,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 400 Bad Request, missing local tool.
    Permanent,
}

impl ErrorKind {
    /// Returns a stable lowercase label for logs and telemetry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::RateLimited => "rate_limited",
            Self::QuotaOrAuth => "quota_or_auth",
            Self::Malformed => "malformed",
            Self::Permanent => "permanent",
        }
    }
}

/// Errors that can be classified for retry decisions.
pub trait Classify {
    /// Returns the failure class of this error.
    fn kind(&self) -> ErrorKind;
}

/// Classifies an HTTP status code into a failure kind.
///
/// | Status | Kind |
/// |--------|------|
/// | 401, 402, 403 | QuotaOrAuth |
/// | 408 | TransientNetwork |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | 5xx | TransientNetwork |
///
/// Explicit match arms are used for each status code for documentation purposes,
/// even though some return the same value.
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::QuotaOrAuth, // Unauthorized
        402 => ErrorKind::QuotaOrAuth, // Payment Required (credits exhausted)
        403 => ErrorKind::QuotaOrAuth, // Forbidden (quotaExceeded on the search API)
        408 => ErrorKind::TransientNetwork,
        429 => ErrorKind::RateLimited,

        status if (400..500).contains(&status) => ErrorKind::Permanent,
        status if (500..600).contains(&status) => ErrorKind::TransientNetwork,

        // Anything else is unexpected, treat as permanent
        _ => ErrorKind::Permanent,
    }
}

/// Classifies a reqwest error.
///
/// Status errors defer to [`classify_http_status`]; TLS/certificate failures are
/// permanent; decode failures are malformed; everything else on the wire is
/// transient.
#[must_use]
pub fn classify_reqwest_error(error: &reqwest::Error) -> ErrorKind {
    if let Some(status) = error.status() {
        return classify_http_status(status.as_u16());
    }
    if is_tls_error(error) {
        return ErrorKind::Permanent;
    }
    if error.is_decode() {
        return ErrorKind::Malformed;
    }
    if error.is_builder() {
        return ErrorKind::Permanent;
    }
    ErrorKind::TransientNetwork
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
