//! Retry with exponential back-off and jitter.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! errors that report themselves as [`Retriable`]. Everything else is returned
//! on the first failure, untouched.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use postpulse_core::IngestError;

/// Classifies an error for [`retry_with_backoff`].
pub trait Retriable {
    /// Whether another attempt could succeed.
    fn is_retriable(&self) -> bool;

    /// Minimum wait requested by the upstream (e.g. HTTP `Retry-After`).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retriable for IngestError {
    fn is_retriable(&self) -> bool {
        IngestError::is_retriable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_secs().map(Duration::from_secs)
    }
}

/// Bounded exponential back-off settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure. `0` disables retries.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Scale each delay by a uniform random factor in `[0.5, 1.5)`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No retries and no waiting; handy for tests and for callers that retry
    /// at a higher level.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    /// Un-jittered delay before retry number `attempt` (0-indexed):
    /// `min(max_delay, initial_delay * backoff_factor^attempt)`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    fn delay_for<E: Retriable>(&self, attempt: u32, err: &E) -> Duration {
        let mut delay = self.base_delay(attempt);
        if self.jitter {
            delay = delay.mul_f64(rand::random::<f64>() + 0.5);
        }
        if let Some(floor) = err.retry_after() {
            delay = delay.max(floor);
        }
        delay.min(self.max_delay)
    }

    /// Runs `operation` under this policy, logging each retry.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-retriable error.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Retriable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        retry_with_backoff(
            self,
            |err: &E, attempt| {
                tracing::warn!(
                    attempt,
                    max_retries = self.max_retries,
                    error = %err,
                    "transient error, retrying after back-off"
                );
            },
            operation,
        )
        .await
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// retriable errors.
///
/// `on_error(err, attempt)` is called before each back-off wait with the error
/// that triggered it and the 0-indexed retry number. It cannot stop the retry.
///
/// | Retry | Wait (factor 2, no jitter) |
/// |-------|----------------------------|
/// | 0     | `initial_delay`            |
/// | 1     | `initial_delay × 2`        |
/// | 2     | `initial_delay × 4`        |
///
/// Each wait is capped at `max_delay`. The error is returned unmodified once
/// retries are exhausted.
///
/// # Errors
///
/// Propagates the last error from `operation`.
pub async fn retry_with_backoff<T, E, F, Fut, H>(
    policy: &RetryPolicy,
    mut on_error: H,
    mut operation: F,
) -> Result<T, E>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&E, u32),
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt >= policy.max_retries {
                    return Err(err);
                }
                on_error(&err, attempt);
                let delay = policy.delay_for(attempt, &err);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
