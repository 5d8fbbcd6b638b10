//! The attempt loop shared by every network-bound call.

use std::error::Error as StdError;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, warn};

use super::{Classify, ErrorKind, RetryDecision, RetryPolicy};

/// Error returned by [`RetryExecutor::execute`].
///
/// Both variants carry the last error raised by the operation unchanged.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: StdError + 'static,
{
    /// The operation failed with a kind the policy does not retry.
    #[error("{operation} failed: {source}")]
    Permanent {
        /// Name of the operation, for diagnostics.
        operation: String,
        /// The non-retryable error.
        #[source]
        source: E,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error(
        "{operation} failed after {attempts} attempt(s): {source}\n  Suggestion: Check your network connection and try again later"
    )]
    Exhausted {
        /// Name of the operation, for diagnostics.
        operation: String,
        /// How many attempts were made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: StdError + 'static,
{
    /// Returns the number of attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { .. } => 1,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Returns the error raised by the last attempt.
    #[must_use]
    pub fn inner(&self) -> &E {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    /// Consumes the wrapper and returns the last error.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}

impl<E> Classify for RetryError<E>
where
    E: StdError + Classify + 'static,
{
    fn kind(&self) -> ErrorKind {
        self.inner().kind()
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// The executor is stateless; a single instance can be shared by every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Invokes `op` until it succeeds, fails with a non-retryable error, or the
    /// policy's attempts are used up.
    ///
    /// Between attempts the task sleeps for the policy's backoff delay, so other
    /// tasks keep running.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Permanent`] for non-retryable failures and
    /// [`RetryError::Exhausted`] when the final allowed attempt fails.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Classify + 'static,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(operation, attempt, "attempting operation");

            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let kind = error.kind();

                    match policy.should_retry(kind, attempt) {
                        RetryDecision::Retry { delay, .. } => {
                            warn!(
                                operation,
                                attempt,
                                max_attempts = policy.max_attempts(),
                                kind = kind.as_str(),
                                wait_secs = delay.as_secs_f64(),
                                error = %error,
                                "attempt {attempt}/{} failed, waiting {:.1}s",
                                policy.max_attempts(),
                                delay.as_secs_f64()
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(operation, %reason, "not retrying");
                            let operation = operation.to_string();
                            if policy.is_retryable(kind) {
                                return Err(RetryError::Exhausted {
                                    operation,
                                    attempts: attempt,
                                    source: error,
                                });
                            }
                            return Err(RetryError::Permanent {
                                operation,
                                source: error,
                            });
                        }
                    }
                }
            }
        }
    }
}
