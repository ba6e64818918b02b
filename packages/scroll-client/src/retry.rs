//! Exponential backoff for single network calls.
//!
//! The wrapped operation performs exactly one request and classifies its own
//! outcome: `Ok` ends the loop, `Err(TransientError)` schedules another
//! attempt. Anything that should not be retried (a response that decodes into
//! the wrong shape, for instance) must be handled by the caller after the loop
//! returns.
//!
//! Delays start at `initial_interval`, grow by `multiplier`, are capped at
//! `max_interval`, and the loop gives up once the next delay would push the
//! total elapsed time past `max_elapsed_time`. The cancellation token is raced
//! against both the in-flight attempt and every backoff sleep.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = RetryConfig::default();
//! let body = with_retry(&config, &cancel, "search", || async {
//!     send_once().await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RetryError, TransientError};

/// Backoff schedule for [`with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the second attempt
    pub initial_interval: Duration,
    /// Growth factor applied after each failed attempt
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_interval: Duration,
    /// Total time budget across all attempts and delays
    pub max_elapsed_time: Duration,
    /// Each delay is drawn from `interval * (1 ± randomization_factor)`
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 1.5,
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(5 * 60),
            randomization_factor: 0.5,
        }
    }
}

impl RetryConfig {
    /// Set the delay before the second attempt.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the per-delay cap.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the total time budget.
    pub fn with_max_elapsed_time(mut self, budget: Duration) -> Self {
        self.max_elapsed_time = budget;
        self
    }

    /// Disable jitter so delays follow the schedule exactly.
    pub fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    /// Interval that follows `current` in the schedule.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.multiplier;
        if grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(grown)
        }
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let delta = self.randomization_factor * interval.as_secs_f64();
        let min = interval.as_secs_f64() - delta;
        let span = 2.0 * delta;
        Duration::from_secs_f64((min + fastrand::f64() * span).max(0.0))
    }
}

/// Run `attempt` until it succeeds, the budget runs out, or `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: &str,
    mut attempt: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransientError>>,
{
    let started = Instant::now();
    let mut interval = config.initial_interval;
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts });
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
            outcome = attempt() => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempts > 1 {
                    debug!(operation, attempts, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let delay = config.randomize(interval);
        let elapsed = started.elapsed();
        if elapsed + delay > config.max_elapsed_time {
            warn!(
                operation,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "retry budget exhausted"
            );
            return Err(RetryError::Exhausted {
                attempts,
                elapsed,
                last: err,
            });
        }

        warn!(
            operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "request failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
            _ = sleep(delay) => {}
        }

        interval = config.next_interval(interval);
    }
}
