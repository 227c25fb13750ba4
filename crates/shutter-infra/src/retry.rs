//! Retry controller
//!
//! Bounded exponential backoff with jitter around a fallible async call:
//! `delay = base * growth_factor^attempt + jitter`, at most `max_retries`
//! retries after the first attempt. Only errors whose
//! [`ErrorMetadata::is_retryable`] is true are retried.

use rand::Rng;
use shutter_core::{ErrorMetadata, UploadConfig};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on a single backoff delay, jitter excluded.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub growth_factor: f64,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            growth_factor: config.retry_growth_factor,
            max_jitter: Duration::from_millis(config.retry_max_jitter_ms),
        }
    }

    /// Policy that never waits; for tests and tight loops.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            growth_factor: 1.0,
            max_jitter: Duration::ZERO,
        }
    }

    /// Deterministic part of the delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.growth_factor.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            return MAX_BACKOFF;
        }
        Duration::from_secs_f64(secs)
    }

    /// Full delay including random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis().min(u64::MAX as u128) as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}

/// Notification handed to the retry hook before each backoff sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based number of the retry about to happen.
    pub retry: u32,
    pub delay: Duration,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails terminally or exhausts the retries.
    ///
    /// `op` receives the 0-based attempt number. `on_retry` is awaited before
    /// every backoff sleep, so callers can persist the retry count first. If
    /// `cancel` fires during a backoff sleep, the last error is returned
    /// immediately.
    pub async fn run<T, E, Op, OpFut, Hook, HookFut>(
        &self,
        cancel: &CancellationToken,
        mut op: Op,
        mut on_retry: Hook,
    ) -> Result<T, E>
    where
        E: ErrorMetadata + Display,
        Op: FnMut(u32) -> OpFut,
        OpFut: Future<Output = Result<T, E>>,
        Hook: FnMut(RetryAttempt) -> HookFut,
        HookFut: Future<Output = ()>,
    {
        let mut attempt = 0;
        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::debug!(attempt, error = %error, code = error.error_code(), "Terminal failure, not retrying");
                return Err(error);
            }
            if attempt >= self.policy.max_retries {
                tracing::warn!(
                    attempts = attempt + 1,
                    error = %error,
                    code = error.error_code(),
                    "Retries exhausted"
                );
                return Err(error);
            }
            if cancel.is_cancelled() {
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                retry = attempt + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable failure, backing off"
            );

            on_retry(RetryAttempt {
                retry: attempt + 1,
                delay,
                error: error.to_string(),
            })
            .await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(error),
            }

            attempt += 1;
        }
    }

    /// [`run`](Self::run) without a retry hook.
    pub async fn run_simple<T, E, Op, OpFut>(
        &self,
        cancel: &CancellationToken,
        op: Op,
    ) -> Result<T, E>
    where
        E: ErrorMetadata + Display,
        Op: FnMut(u32) -> OpFut,
        OpFut: Future<Output = Result<T, E>>,
    {
        self.run(cancel, op, |_| async {}).await
    }
}
