//! Metrics collection.
//!
//! # Responsibilities
//! - Count telemetry events by kind and dispatch outcome
//! - Count circuit breaker transitions
//!
//! # Metrics
//! - `telemetry_events_total` (counter): events by `kind`, `outcome`
//! - `telemetry_breaker_transitions_total` (counter): transitions by target state `to`
//!
//! # Design Decisions
//! - Uses the `metrics` facade; the host installs whatever recorder it wants
//! - Without a recorder every call is a no-op

/// Record one event reaching a terminal outcome.
pub fn record_event(kind: &'static str, outcome: &'static str) {
    metrics::counter!("telemetry_events_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record the breaker entering a new state.
pub fn record_breaker_transition(to: &'static str) {
    metrics::counter!("telemetry_breaker_transitions_total", "to" => to).increment(1);
}
