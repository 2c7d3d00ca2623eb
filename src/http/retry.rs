//! Retry classification and backoff schedule.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::error::AppError;

/// Delay before the first retry.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;
/// Upper bound on any single delay.
pub const MAX_BACKOFF_MS: u64 = 10_000;

/// Exponential backoff: `min(base * 2^n, max)` before retry `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  pub min_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
      max_delay: Duration::from_millis(MAX_BACKOFF_MS),
    }
  }
}

impl RetryPolicy {
  pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
    Self {
      min_delay,
      max_delay,
    }
  }

  /// Backoff strategy allowing `retry_limit` retries.
  pub fn backoff(&self, retry_limit: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
      .with_min_delay(self.min_delay)
      .with_max_delay(self.max_delay)
      .with_factor(2.0)
      .with_max_times(retry_limit)
  }

  /// Delay slept after failed attempt `attempt` (0-indexed).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    self
      .min_delay
      .checked_mul(factor)
      .unwrap_or(self.max_delay)
      .min(self.max_delay)
  }

  /// Transport-level failures and server errors are retried; client errors
  /// are not transient, so any 4xx except 408 fails at once.
  pub fn is_retryable(error: &AppError) -> bool {
    match error.status_code {
      Some(408) => true,
      Some(status) => !(400..500).contains(&status),
      None => error.is_network(),
    }
  }
}
