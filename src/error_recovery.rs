// src/error_recovery.rs
//! Retry with exponential backoff for external service calls.
//!
//! Every call site (search, render, archive, completion) runs through the same
//! small state machine so retry behaviour is uniform and observable in logs.

use crate::constants::{RETRY_INITIAL_DELAY, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY};
use crate::error::AppError;
use rand::Rng;
use std::time::Duration;

/// Where a retried call currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// The first attempt is in flight
    Attempting,
    /// `n` retries have been scheduled so far
    Retrying(u32),
    Failed,
    Succeeded,
}

impl RetryState {
    /// Advances the machine after an attempt finished.
    pub fn advance(self, succeeded: bool, retryable: bool, policy: &BackoffPolicy) -> Self {
        match self {
            Self::Succeeded | Self::Failed => self,
            _ if succeeded => Self::Succeeded,
            _ if !retryable => Self::Failed,
            Self::Attempting if policy.max_attempts > 1 => Self::Retrying(1),
            Self::Attempting => Self::Failed,
            Self::Retrying(n) if n + 1 < policy.max_attempts => Self::Retrying(n + 1),
            Self::Retrying(_) => Self::Failed,
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempts including the first; at least 1
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay within its upper half
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            initial_delay: RETRY_INITIAL_DELAY,
            max_delay: RETRY_MAX_DELAY,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Fast, jitter-free policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let millis = delay.as_millis() as u64;
            Duration::from_millis(rand::rng().random_range(millis / 2..=millis))
        } else {
            delay
        }
    }
}

/// Retries an async operation with exponential backoff.
///
/// Only errors for which [`AppError::is_retryable`] holds are retried; anything
/// else ends the call on the first failure.
pub async fn retry_with_backoff<F, T, Fut>(
    operation_name: &str,
    policy: &BackoffPolicy,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut state = RetryState::Attempting;

    loop {
        let outcome = operation().await;
        let retryable = outcome.as_ref().err().is_some_and(AppError::is_retryable);
        state = state.advance(outcome.is_ok(), retryable, policy);

        match (state, outcome) {
            (RetryState::Succeeded, Ok(value)) => return Ok(value),
            (RetryState::Retrying(n), Err(e)) => {
                let delay = policy.delay_for(n);
                log::warn!(
                    "{} failed ({}), retry {}/{} after {:?}",
                    operation_name,
                    e,
                    n,
                    policy.max_attempts.saturating_sub(1),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            (_, Err(e)) => {
                if retryable {
                    log::warn!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        policy.max_attempts,
                        e
                    );
                }
                return Err(e);
            }
            (_, Ok(value)) => return Ok(value),
        }
    }
}
