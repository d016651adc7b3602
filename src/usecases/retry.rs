//! Retry and Timeout Utilities - Shared by Scheduler and Monitor
//!
//! Retries are an explicit bounded loop driven by `RetryPolicy`; the
//! policy only answers "how many attempts" and "how long to wait after
//! attempt N". `with_timeout` guards call sites that need a deadline.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MonitorError, Result};

/// Growth of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
  /// Same delay after every attempt.
  Fixed,
  /// `base * attempt`.
  #[default]
  Linear,
  /// `base * 2^(attempt - 1)`.
  Exponential,
}

/// Attempt budget and backoff of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  max_attempts: u32,
  base_delay: Duration,
  strategy: BackoffStrategy,
}

impl RetryPolicy {
  /// Create a policy. At least one attempt is always made.
  pub fn new(max_attempts: u32, base_delay_ms: u64, strategy: BackoffStrategy) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_delay: Duration::from_millis(base_delay_ms),
      strategy,
    }
  }

  /// Total attempts allowed.
  pub const fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  /// Delay to wait after failed attempt `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    match self.strategy {
      BackoffStrategy::Fixed => self.base_delay,
      BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
      BackoffStrategy::Exponential => {
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
      }
    }
  }

  /// Whether another attempt follows failed attempt `attempt`.
  pub const fn should_retry(&self, attempt: u32) -> bool {
    attempt < self.max_attempts
  }
}

/// Await `future`, failing with `MonitorError::Timeout(message)` after `duration`.
pub async fn with_timeout<F, T>(future: F, duration: Duration, message: &str) -> Result<T>
where
  F: Future<Output = T>,
{
  tokio::time::timeout(duration, future)
    .await
    .map_err(|_| MonitorError::Timeout(message.to_string()))
}

/// Apply `with_timeout` only when a limit is configured.
pub async fn maybe_with_timeout<F, T>(future: F, limit_ms: Option<u64>, message: &str) -> Result<T>
where
  F: Future<Output = T>,
{
  match limit_ms {
    Some(ms) => with_timeout(future, Duration::from_millis(ms), message).await,
    None => Ok(future.await),
  }
}
