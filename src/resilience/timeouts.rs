//! Timeout enforcement.
//!
//! # Responsibilities
//! - Hold the validated per-request timeout
//! - Compute the worst-case wall-clock exposure of one public call
//!
//! # Design Decisions
//! - The transport applies the timeout to every attempt
//! - Exposure = timeout × (1 + retries) + every backoff the policy allows

use std::time::Duration;

use crate::config::validation::{validate_timeout, ValidationError};
use crate::resilience::retries::RetryPolicy;

/// Per-request timeout, guaranteed to lie in `[0.5s, 5.0s]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestTimeout(Duration);

impl RequestTimeout {
    pub fn from_secs_f64(secs: f64) -> Result<Self, ValidationError> {
        match validate_timeout(secs) {
            Some(err) => Err(err),
            None => Ok(Self(Duration::from_secs_f64(secs))),
        }
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Upper bound on the time one send can spend in the dispatcher.
    pub fn worst_case(&self, policy: &RetryPolicy) -> Duration {
        self.0 * (1 + policy.max_retries) + policy.total_backoff()
    }
}
