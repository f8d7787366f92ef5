//! Bounded retries for fallible asynchronous operations.
//!
//! [`retry`] is the basic combinator: it calls an operation until it succeeds or runs out of retries, and runs a side
//! effect between consecutive attempts. [`RetryPolicy`] packages a retry count and an optional backoff delay so that
//! the same retry behavior can be loaded from configuration and reused across call sites.

use std::{future::Future, time::Duration};

use serde::Deserialize;
use tracing::debug;

mod backoff;
pub use self::backoff::ExponentialBackoff;

const fn default_max_retries() -> usize {
    3
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_backoff_jitter_factor() -> f64 {
    1.0
}

/// Calls `operation` until it succeeds, retrying up to `max_retries` times.
///
/// The operation is always called at least once. If it fails and retries remain, `side_effect` is called and awaited
/// before the next attempt. The output of the side effect is ignored, so it can never affect whether or not the
/// operation is retried. The side effect is never run before the first attempt or after the last one.
///
/// Arguments for the operation should be captured by the closure, which ensures that every attempt sees the same
/// arguments.
///
/// # Errors
///
/// If every attempt fails, the error from the final attempt is returned unchanged.
pub async fn retry<Op, Fut, T, E, Side, SideFut>(
    max_retries: usize, mut side_effect: Side, mut operation: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Side: FnMut() -> SideFut,
    SideFut: Future,
{
    let mut attempt = 1;
    let mut remaining = max_retries;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if remaining == 0 => {
                debug!(attempt, "Operation failed with no retries remaining.");
                return Err(e);
            }
            Err(_) => {
                debug!(attempt, remaining, "Operation failed. Retrying.");

                let _ = side_effect().await;
                remaining -= 1;
                attempt += 1;
            }
        }
    }
}

/// A reusable retry policy.
///
/// Retries an operation up to a fixed number of times, optionally sleeping between attempts according to an
/// [`ExponentialBackoff`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Option<ExponentialBackoff>,
}

impl RetryPolicy {
    /// Creates a new `RetryPolicy` that retries immediately, up to `max_retries` times.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: None,
        }
    }

    /// Sets the backoff to wait between attempts.
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Returns the maximum number of retries.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Returns the backoff used between attempts, if any.
    pub fn backoff(&self) -> Option<&ExponentialBackoff> {
        self.backoff.as_ref()
    }

    /// Runs `operation` under this policy.
    ///
    /// When a backoff is configured, the wait before each retry is based on the number of consecutive failures seen
    /// before the one that triggered it, starting at zero.
    ///
    /// # Errors
    ///
    /// If every attempt fails, the error from the final attempt is returned unchanged.
    pub async fn run<Op, Fut, T, E>(&self, operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match &self.backoff {
            Some(backoff) => {
                let mut error_count = 0;
                let side_effect = || {
                    let delay = backoff.get_backoff_duration(error_count);
                    error_count = error_count.saturating_add(1);

                    debug!(delay_ms = delay.as_millis() as u64, "Backing off before retrying.");
                    tokio::time::sleep(delay)
                };
                retry(self.max_retries, side_effect, operation).await
            }
            None => retry(self.max_retries, || std::future::ready(()), operation).await,
        }
    }
}

/// Retry configuration.
///
/// Deserializable from any configuration source, and converted into a [`RetryPolicy`] with
/// [`into_policy`][Self::into_policy].
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RetryConfiguration {
    /// Maximum number of retries after the first attempt.
    ///
    /// Defaults to 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Minimum backoff between attempts, in milliseconds.
    ///
    /// When set to zero, retries happen immediately and the other backoff settings are ignored.
    ///
    /// Defaults to 0.
    #[serde(default)]
    pub min_backoff_ms: u64,

    /// Maximum backoff between attempts, in milliseconds.
    ///
    /// Values lower than `min_backoff_ms` are raised to `min_backoff_ms`.
    ///
    /// Defaults to 30000.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Jitter factor applied to the backoff.
    ///
    /// Each backoff is picked between `D/factor` and `D`, where `D` is the unjittered backoff. Values of 1.0 or less
    /// disable jitter.
    ///
    /// Defaults to 1.0.
    #[serde(default = "default_backoff_jitter_factor")]
    pub backoff_jitter_factor: f64,
}

impl RetryConfiguration {
    /// Builds a [`RetryPolicy`] from this configuration.
    pub fn into_policy(self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_retries);
        if self.min_backoff_ms == 0 {
            return policy;
        }

        let min_backoff = Duration::from_millis(self.min_backoff_ms);
        let max_backoff = Duration::from_millis(self.max_backoff_ms.max(self.min_backoff_ms));
        policy.with_backoff(ExponentialBackoff::with_jitter(
            min_backoff,
            max_backoff,
            self.backoff_jitter_factor,
        ))
    }
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_backoff_ms: 0,
            max_backoff_ms: default_max_backoff_ms(),
            backoff_jitter_factor: default_backoff_jitter_factor(),
        }
    }
}
