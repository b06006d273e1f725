//! Context collection subsystem.
//!
//! # Data Flow
//! ```text
//! host request + host session
//!     → collector.rs (request / server / user sections)
//!     → scrub.rs (redact sensitive keys at any depth)
//!     → anonymize.rs (zero the host part of client addresses)
//!     → Context (attached to error payloads)
//! ```
//!
//! # Design Decisions
//! - Scrubbing walks `serde_json::Value` trees; no reflection over host types
//! - Collection never fails; a broken section is omitted

pub mod anonymize;
pub mod collector;
pub mod scrub;

pub use anonymize::anonymize_ip;
pub use collector::{
    Context, ContextCollector, NoSession, RequestContext, RequestInfo, ServerContext,
    SessionStore, UserContext,
};
pub use scrub::{Scrubber, REDACTED};
