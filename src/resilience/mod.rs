//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound telemetry request:
//!     → circuit_breaker.rs (allow_request? otherwise drop without a network call)
//!     → timeouts.rs (every attempt carries a deadline)
//!     → On transport failure: retries.rs (retry with backoff.rs delays)
//!     → circuit_breaker.rs (record success or failure)
//!
//! Breaker state:
//!     → store.rs (shared key-value store, TTL, compare-and-swap)
//!     → clock.rs (cooldown timing)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every outbound call has a deadline
//! - Only transport-level failures are retried or count against the breaker
//! - Breaker state is shared across instances through the store
//! - Nothing in this subsystem returns an error at runtime

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod retries;
pub mod store;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use retries::{Delay, RetryPolicy, TokioDelay};
pub use store::{InMemoryStore, StateStore, StoreError};
pub use timeouts::RequestTimeout;
