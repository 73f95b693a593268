//! Retry policy for transient fetch failures
//!
//! The batch fetcher never gives up on a range by default: a failed request is
//! reissued, unchanged, after a fixed delay. [`RetryPolicy`] wraps that rule
//! (plus optional backoff, jitter, and an attempt ceiling) so the fetch loop
//! only has to ask "how long do I wait" and "may I try again".
//!
//! # Example
//!
//! ```no_run
//! use ct_fetch_bench::config::RetryConfig;
//! use ct_fetch_bench::error::Error;
//! use ct_fetch_bench::retry::{RetryPolicy, retry_with_policy};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::new(&RetryConfig::default());
//! let entries = retry_with_policy(&policy, || async {
//!     // Fetch a page of entries here
//!     Ok::<u64, Error>(1024)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // A failed or empty page never invalidates the range it was asked
            // for, so every transport, status and body problem is worth another attempt
            Error::Network(_)
            | Error::HttpStatus { .. }
            | Error::Decode(_)
            | Error::MissingField(_)
            | Error::EmptyPage { .. } => true,
            Error::Config { .. } => false,
            Error::RetriesExhausted { .. } => false,
            Error::Task(_) => false,
            Error::ShuttingDown => false,
        }
    }
}

/// Delay schedule and attempt ceiling derived from a [`RetryConfig`]
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Fixed interval, unbounded attempts
    pub fn fixed(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Same policy with an attempt ceiling
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Attempt ceiling, if any
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts` have failed
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }

    /// Base delay after the `failures`-th consecutive failure (1-based), before jitter
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay.max(self.initial_delay))
    }

    /// Delay to sleep after the `failures`-th consecutive failure
    pub fn delay_for(&self, failures: u32) -> Duration {
        let delay = self.base_delay(failures);
        if self.jitter { add_jitter(delay) } else { delay }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy gives up
///
/// Every failure is logged once. Returns the first success, the first
/// non-retryable error, or the last error once the attempt ceiling is reached.
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut failures = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if failures > 0 {
                    tracing::debug!(attempts = failures + 1, "Request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && policy.allows_retry(failures + 1) => {
                failures += 1;
                let delay = policy.delay_for(failures);

                tracing::warn!(
                    error = %e,
                    attempt = failures,
                    max_attempts = ?policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    "Request failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = failures + 1,
                        "Request failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Request failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
