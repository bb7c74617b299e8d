//! Retry with exponential backoff
//!
//! Delays start at `initial_delay`, grow by `backoff_factor` per retry and are
//! capped at `max_delay`. With `max_retries = 3` an operation runs at most
//! four times. Exhaustion yields a fallback value instead of an error.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(30_000),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or attempts are exhausted; `None` on exhaustion
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_inner(label, op).await
    }

    /// Like [`run`](Self::run) but returns `fallback` on exhaustion
    pub async fn run_or<T, E, F, Fut>(&self, label: &str, fallback: T, op: F) -> T
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_inner(label, op).await.unwrap_or(fallback)
    }

    async fn run_inner<T, E, F, Fut>(&self, label: &str, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.max_attempts();
        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(
                        target_label = %label,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    if attempt < attempts {
                        let delay = self.delay_for(attempt - 1);
                        debug!(target_label = %label, ?delay, "Retrying after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        None
    }
}
