//! Telemetry client subsystem.
//!
//! # Responsibilities
//! - Expose the send operations hosts call (errors, session lifecycle, raw events)
//! - Assemble payloads from breadcrumbs and collected context
//! - Gate, dispatch and retry through the resilience subsystem
//!
//! # Data Flow
//! ```text
//! host call (send_error / capture_error / create_session / submit_event ...)
//!     → telemetry.rs (encode, stamp defaults, pick endpoint)
//!     → dispatch.rs (breaker gate, spawn or await, retries, breaker update)
//!     → transport.rs (HTTP POST with X-Api-Key, per-request timeout)
//!     → outcome.rs (DispatchOutcome, logged and counted, then dropped)
//! ```
//!
//! # Design Decisions
//! - Public send operations return `()`; every failure is absorbed here
//! - Only transport failures are retried or penalize the breaker
//! - Fire-and-forget spawns onto the ambient tokio runtime; outside a runtime
//!   the send runs inline

mod dispatch;
pub mod outcome;
pub mod payload;
mod telemetry;
pub mod transport;

pub use dispatch::ACCEPTED;
pub use outcome::{DispatchOutcome, TelemetryError};
pub use payload::{EncodingError, ErrorPayload, EventKind, StackFrame, TelemetryEvent};
pub use telemetry::{default_store_key, TelemetryClient, TelemetryClientBuilder};
pub use transport::{HttpTransport, OutboundRequest, ReqwestTransport, TransportError, USER_AGENT};
