//! Retry policies and backoff delay calculation.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::ErrorKind;

/// Default maximum attempts (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (5 minutes). None of the presets reach it.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Decision on whether to retry a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the operation.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay(n) = min(base_delay * factor^(n-1), max_delay) + jitter
/// ```
///
/// where `n` is the attempt that just failed. With `{3, 1s, 2.0}` the waits are
/// 1s then 2s, and the third failure is surfaced to the caller.
///
/// Jitter is zero unless enabled with [`RetryPolicy::with_jitter`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay before the first retry.
    base_delay: Duration,

    /// Multiplier applied each attempt, always >= 1.0.
    backoff_factor: f64,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Upper bound for random jitter added to each delay.
    max_jitter: Duration,

    /// Failure kinds that are worth another attempt.
    retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_BASE_DELAY,
            DEFAULT_BACKOFF_FACTOR,
            [ErrorKind::TransientNetwork, ErrorKind::RateLimited],
        )
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Delay before the first retry
    /// * `backoff_factor` - Multiplier for exponential increase (clamped to >= 1.0)
    /// * `retryable` - Failure kinds that trigger another attempt
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff_factor: f64,
        retryable: impl IntoIterator<Item = ErrorKind>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor: if backoff_factor.is_finite() {
                backoff_factor.max(1.0)
            } else {
                DEFAULT_BACKOFF_FACTOR
            },
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: Duration::ZERO,
            retryable: retryable.into_iter().collect(),
        }
    }

    /// Preset for connectivity-sensitive calls: 5 attempts, 2s base, doubling.
    #[must_use]
    pub fn network() -> Self {
        Self::new(
            5,
            Duration::from_secs(2),
            2.0,
            [ErrorKind::TransientNetwork, ErrorKind::RateLimited],
        )
    }

    /// Preset for third-party API calls: 3 attempts, 1s base, doubling.
    #[must_use]
    pub fn api() -> Self {
        Self::new(
            3,
            Duration::from_secs(1),
            2.0,
            [ErrorKind::TransientNetwork, ErrorKind::RateLimited],
        )
    }

    /// Preset for media transfers: 3 attempts, 5s base, doubling.
    #[must_use]
    pub fn download() -> Self {
        Self::new(
            3,
            Duration::from_secs(5),
            2.0,
            [ErrorKind::TransientNetwork, ErrorKind::RateLimited],
        )
    }

    /// Replaces the maximum delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enables random jitter of up to `max_jitter` on every delay.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns true if failures of this kind are retried under this policy.
    #[must_use]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Determines whether to retry a failed operation.
    ///
    /// # Arguments
    ///
    /// * `kind` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        if !self.is_retryable(kind) {
            return RetryDecision::DoNotRetry {
                reason: format!("{} failure is not retryable", kind.as_str()),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay after a failed attempt.
    ///
    /// Formula: `min(base_delay * factor^(attempt-1), max_delay) + jitter`
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub(crate) fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * self.backoff_factor.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=self.max_jitter.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}
