//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! breaker, dispatcher, collectors produce:
//!     → logging.rs (structured log events, debug-flag gated)
//!     → metrics.rs (event and breaker transition counters)
//!
//! Consumers:
//!     → whatever tracing subscriber / metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - The library emits but never installs; only the CLI calls `logging::init`
//! - Nothing here may fail in a way the host can observe

pub mod logging;
pub mod metrics;
