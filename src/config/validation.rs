//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeout window, breaker thresholds, ring capacity)
//! - Check that the DSN parses and an API key is present
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BreakerConfig, ClientConfig};
use crate::dsn::Dsn;

/// Lower bound for the per-request timeout, in seconds.
pub const MIN_TIMEOUT_SECS: f64 = 0.5;
/// Upper bound for the per-request timeout, in seconds.
pub const MAX_TIMEOUT_SECS: f64 = 5.0;
/// Shortest permitted open period for the breaker, in seconds.
pub const MIN_BREAKER_TIMEOUT_SECS: u64 = 10;
/// Retry attempts above this are rejected.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Breadcrumb ring capacity bounds.
pub const MIN_BREADCRUMBS: usize = 10;
pub const MAX_BREADCRUMBS: usize = 100;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid dsn: {0}")]
    Dsn(String),

    #[error("api_key must not be empty")]
    MissingApiKey,

    #[error("timeout_secs must be within [0.5, 5.0], got {0}")]
    Timeout(f64),

    #[error("retry_attempts must be at most 10, got {0}")]
    RetryAttempts(u32),

    #[error("breaker.failure_threshold must be at least 1, got {0}")]
    FailureThreshold(u32),

    #[error("breaker.timeout_secs must be at least 10, got {0}")]
    BreakerTimeout(u64),

    #[error("breaker.max_half_open_attempts must be at least 1, got {0}")]
    HalfOpenAttempts(u32),

    #[error("breaker.state_ttl_secs ({ttl}) must not be shorter than breaker.timeout_secs ({timeout})")]
    StateTtl { ttl: u64, timeout: u64 },

    #[error("breadcrumbs.max_breadcrumbs must be within [10, 100], got {0}")]
    BreadcrumbCapacity(usize),
}

/// Validate a full client configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = Dsn::parse(&config.dsn) {
        errors.push(ValidationError::Dsn(e.to_string()));
    }
    if config.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }
    errors.extend(validate_timeout(config.timeout_secs));
    if config.retry_attempts > MAX_RETRY_ATTEMPTS {
        errors.push(ValidationError::RetryAttempts(config.retry_attempts));
    }
    errors.extend(validate_breaker(&config.breaker));
    errors.extend(validate_breadcrumb_capacity(config.breadcrumbs.max_breadcrumbs));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Range check for the per-request timeout. NaN is rejected.
pub fn validate_timeout(timeout_secs: f64) -> Option<ValidationError> {
    if (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
        None
    } else {
        Some(ValidationError::Timeout(timeout_secs))
    }
}

/// Checks applied when constructing a circuit breaker.
pub fn validate_breaker(breaker: &BreakerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if breaker.failure_threshold < 1 {
        errors.push(ValidationError::FailureThreshold(breaker.failure_threshold));
    }
    if breaker.timeout_secs < MIN_BREAKER_TIMEOUT_SECS {
        errors.push(ValidationError::BreakerTimeout(breaker.timeout_secs));
    }
    if breaker.max_half_open_attempts < 1 {
        errors.push(ValidationError::HalfOpenAttempts(breaker.max_half_open_attempts));
    }
    if breaker.state_ttl_secs < breaker.timeout_secs {
        errors.push(ValidationError::StateTtl {
            ttl: breaker.state_ttl_secs,
            timeout: breaker.timeout_secs,
        });
    }
    errors
}

/// Range check for the breadcrumb ring capacity.
pub fn validate_breadcrumb_capacity(capacity: usize) -> Option<ValidationError> {
    if (MIN_BREADCRUMBS..=MAX_BREADCRUMBS).contains(&capacity) {
        None
    } else {
        Some(ValidationError::BreadcrumbCapacity(capacity))
    }
}
