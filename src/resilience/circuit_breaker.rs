//! Circuit breaker for the ingestion endpoint.
//!
//! # States
//! - Closed: normal operation, events are sent
//! - Open: ingestion assumed down, events are dropped without a network call
//! - Half-Open: a limited number of trial sends test for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: now - opened_at >= timeout
//! Half-Open → Closed: a trial send succeeds
//! Half-Open → Open: a trial send fails (opened_at refreshed)
//! any → Closed: reset()
//! ```
//!
//! # Design Decisions
//! - State lives in an injected `StateStore`, never in process memory, so every
//!   client instance sharing the store sees one breaker
//! - Read-modify-write goes through `compare_and_swap`; a lost race retries a few
//!   times and then gives up, which can blur the failure count but not the gate
//! - Any store failure reads as a fresh Closed state
//! - A disabled breaker reports Closed and never writes

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::validation::validate_breaker;
use crate::config::{BreakerConfig, ConfigError};
use crate::observability::logging::log_swallowed;
use crate::observability::metrics;
use crate::resilience::clock::Clock;
use crate::resilience::store::{StateStore, StoreError};

/// Attempts at a contended compare-and-swap before the update is dropped.
const CAS_ATTEMPTS: u32 = 3;

/// Coarse breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

/// Persisted breaker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    #[serde(rename = "state")]
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_attempts: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            failure_count: 0,
            opened_at: None,
            half_open_attempts: 0,
        }
    }
}

/// A breaker whose state is shared through a [`StateStore`].
pub struct CircuitBreaker {
    config: BreakerConfig,
    key: String,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    debug: bool,
}

impl CircuitBreaker {
    /// Create a breaker persisting under `key`.
    ///
    /// Fails when `failure_threshold < 1`, `timeout_secs < 10` or
    /// `max_half_open_attempts < 1`.
    pub fn new(
        config: BreakerConfig,
        key: impl Into<String>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let errors = validate_breaker(&config);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(Self {
            config,
            key: key.into(),
            store,
            clock,
            debug: false,
        })
    }

    /// Log store failures at warn level instead of debug.
    pub fn with_debug_logging(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// True while Open and the cooldown has not elapsed.
    pub fn is_open(&self) -> bool {
        self.config.enabled && self.state().status == CircuitStatus::Open
    }

    /// True once the cooldown has elapsed and no trial has closed or reopened the circuit.
    pub fn is_half_open(&self) -> bool {
        self.config.enabled && self.state().status == CircuitStatus::HalfOpen
    }

    /// Current state, with an expired Open already reported as HalfOpen.
    pub fn state(&self) -> CircuitState {
        if !self.config.enabled {
            return CircuitState::default();
        }
        let (_, stored) = self.load();
        self.advance(stored, self.clock.now())
    }

    /// Gate for one outbound call.
    ///
    /// Closed always passes. Half-open passes while trial slots remain and
    /// consumes one. Open never passes.
    pub fn allow_request(&self) -> bool {
        if !self.config.enabled {
            return true;
        }
        let max_trials = self.config.max_half_open_attempts;
        self.update(|state, _| match state.status {
            CircuitStatus::Closed => true,
            CircuitStatus::Open => false,
            CircuitStatus::HalfOpen => {
                if state.half_open_attempts < max_trials {
                    state.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        })
    }

    /// Reset the failure count and close the circuit.
    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }
        self.update(|state, _| {
            *state = CircuitState::default();
        });
    }

    /// Count a failure, opening the circuit at the threshold.
    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }
        let threshold = self.config.failure_threshold;
        self.update(|state, now| {
            state.failure_count = state.failure_count.saturating_add(1);
            match state.status {
                CircuitStatus::Closed if state.failure_count >= threshold => {
                    state.status = CircuitStatus::Open;
                    state.opened_at = Some(now);
                    state.half_open_attempts = 0;
                }
                CircuitStatus::HalfOpen => {
                    state.status = CircuitStatus::Open;
                    state.opened_at = Some(now);
                    state.half_open_attempts = 0;
                }
                _ => {}
            }
        });
    }

    /// Force the circuit closed with a zero count. Works even when disabled.
    pub fn reset(&self) {
        match self.encode(&CircuitState::default()) {
            Ok(encoded) => {
                if let Err(e) = self.store.set(&self.key, &encoded, self.ttl()) {
                    self.log_store_error(&e);
                }
            }
            Err(e) => self.log_store_error(&e),
        }
        tracing::debug!(key = %self.key, "Circuit breaker reset");
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.state_ttl_secs)
    }

    fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.timeout_secs.min(i64::MAX as u64) as i64)
    }

    /// Apply the time-driven Open → HalfOpen transition.
    fn advance(&self, mut state: CircuitState, now: DateTime<Utc>) -> CircuitState {
        if state.status == CircuitStatus::Open {
            // A missing timestamp cannot cool down; treat it as just opened.
            let opened_at = state.opened_at.unwrap_or(now);
            if now - opened_at >= self.cooldown() {
                state.status = CircuitStatus::HalfOpen;
                state.half_open_attempts = 0;
            }
        }
        state
    }

    /// Raw stored value (for CAS) and decoded state. Failures read as fresh Closed.
    fn load(&self) -> (Option<String>, CircuitState) {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw,
            Err(e) => {
                self.log_store_error(&e);
                return (None, CircuitState::default());
            }
        };
        let state = match raw.as_deref().map(serde_json::from_str::<CircuitState>) {
            None => CircuitState::default(),
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                self.log_store_error(&StoreError::Corrupt {
                    key: self.key.clone(),
                    reason: e.to_string(),
                });
                CircuitState::default()
            }
        };
        (raw, state)
    }

    fn encode(&self, state: &CircuitState) -> Result<String, StoreError> {
        serde_json::to_string(state).map_err(|e| StoreError::Corrupt {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    fn update<R>(&self, mut apply: impl FnMut(&mut CircuitState, DateTime<Utc>) -> R) -> R {
        let now = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (raw, stored) = self.load();
            let mut state = self.advance(stored.clone(), now);
            let result = apply(&mut state, now);
            if state == stored {
                return result;
            }

            let written = self.encode(&state).and_then(|encoded| {
                self.store
                    .compare_and_swap(&self.key, raw.as_deref(), &encoded, self.ttl())
            });
            match written {
                Ok(true) => {
                    self.observe_transition(&stored, &state);
                    return result;
                }
                Ok(false) if attempt < CAS_ATTEMPTS => continue,
                Ok(false) => {
                    tracing::debug!(key = %self.key, "Breaker update dropped after repeated contention");
                    return result;
                }
                Err(e) => {
                    self.log_store_error(&e);
                    return result;
                }
            }
        }
    }

    fn observe_transition(&self, before: &CircuitState, after: &CircuitState) {
        if before.status == after.status {
            return;
        }
        metrics::record_breaker_transition(after.status.as_str());
        log_swallowed!(
            self.debug,
            key = %self.key,
            from = before.status.as_str(),
            to = after.status.as_str(),
            failure_count = after.failure_count,
            "Circuit breaker transition"
        );
    }

    fn log_store_error(&self, err: &StoreError) {
        log_swallowed!(
            self.debug,
            key = %self.key,
            error = %err,
            "Breaker store failure; assuming closed circuit"
        );
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("enabled", &self.config.enabled)
            .field("failure_threshold", &self.config.failure_threshold)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}
