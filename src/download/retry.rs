//! Retry logic with a fixed backoff for transient failures.
//!
//! This module provides the [`RetryPolicy`] combinator used for every
//! network request and for whole release materializations.
//!
//! # Overview
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//!
//! Permanent errors are returned as-is after the first attempt. Transient
//! errors are retried after a fixed backoff until the configured number of
//! retries is exhausted, at which point the last error is wrapped with
//! [`Retryable::exhausted`]. Implementors make that wrapped error permanent,
//! so a retry nested inside another retry never multiplies the attempts.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bandcamp_downloader::download::RetryPolicy;
//! use bandcamp_downloader::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10));
//! let value = policy
//!     .run("compute answer", || async { Ok::<_, Error>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff between two attempts (1 second).
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Classification of failure types.
///
/// Used to determine whether a failed operation should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, unexpected HTTP status, truncated archive.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: unknown account, folder/file conflict, exhausted inner retry.
    Permanent,
}

/// Errors the retry combinator knows how to classify and wrap.
pub trait Retryable: Sized + Display {
    /// Whether another attempt could succeed.
    fn failure_type(&self) -> FailureType;

    /// Builds the error returned once all retries failed.
    fn exhausted(operation: &str, retries: u32, last: Self) -> Self;
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration: how many retries, and how long to wait between them.
///
/// # Default Values
///
/// - `max_retries`: 3 (so 4 attempts in total)
/// - `backoff`: 1 second
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    max_retries: u32,

    /// Fixed delay between two attempts.
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    #[must_use]
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Creates a policy with a custom retry count and the default backoff.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Returns the configured number of retries.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the configured backoff.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Determines whether to retry after a failed attempt.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(level = "trace", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt > self.max_retries {
            debug!(attempt, max = self.max_retries, "max retries reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        RetryDecision::Retry {
            delay: self.backoff,
            attempt: attempt + 1,
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// # Errors
    ///
    /// Returns the permanent error unchanged, or `E::exhausted(..)` wrapping
    /// the last transient error.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(operation, attempt, error = %error, "error while trying");
                    match self.should_retry(error.failure_type(), attempt) {
                        RetryDecision::Retry { delay, attempt: next } => {
                            info!(
                                operation,
                                "Retrying ({}/{})",
                                next - 1,
                                self.max_retries
                            );
                            tokio::time::sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(operation, %reason, "not retrying");
                            if error.failure_type() == FailureType::Permanent {
                                return Err(error);
                            }
                            return Err(E::exhausted(operation, self.max_retries, error));
                        }
                    }
                }
            }
        }
    }

    /// Like [`RetryPolicy::run`], but when `ignore_failure` is set a final
    /// failure is logged and turned into `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Same as [`RetryPolicy::run`] when `ignore_failure` is false.
    pub async fn run_or_ignore<T, E, F, Fut>(
        &self,
        operation: &str,
        ignore_failure: bool,
        op: F,
    ) -> Result<Option<T>, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.run(operation, op).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if ignore_failure => {
                warn!(operation, error = %error, "giving up, skipping");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
