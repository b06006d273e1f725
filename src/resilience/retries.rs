//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failed send while the failure is retryable and budget remains
//! - Wait an exponential backoff between attempts through an injectable delay
//!
//! # Design Decisions
//! - Bounded loop, not recursion
//! - The caller decides what is retryable; the dispatcher retries transport
//!   failures only, never an unexpected status on a completed response

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::resilience::backoff::{calculate_backoff, BASE_DELAY_MS, MAX_DELAY_MS};

/// Something that can wait. Tests swap in a recorder that returns immediately.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waiting on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.base_delay_ms, self.max_delay_ms)
    }

    /// Sum of every backoff the policy can incur.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries).map(|r| self.delay_for(r)).sum()
    }
}

/// Result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    delay: &dyn Delay,
    is_retryable: R,
    mut op: F,
) -> Retried<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt <= policy.max_retries && is_retryable(&e) => {
                let wait = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = wait.as_millis() as u64,
                    error = %e,
                    "Send failed, retrying"
                );
                delay.sleep(wait).await;
            }
            Err(e) => {
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}
