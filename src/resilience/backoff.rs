//! Exponential backoff.

use std::time::Duration;

/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1_000;
/// Ceiling for any single backoff.
pub const MAX_DELAY_MS: u64 = 2_000;

/// Calculate the exponential backoff delay before retry number `attempt`.
///
/// Retry 1 waits `base_ms`, each further retry doubles it, capped at `max_ms`.
/// Attempt 0 (the initial send) waits nothing.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    Duration::from_millis(delay_ms.min(max_ms))
}
