//! Resilient telemetry client library.
//!
//! Captures errors and session activity inside a host application and
//! forwards them to an ingestion API without ever blocking, panicking or
//! erroring into the host.

pub mod breadcrumbs;
pub mod client;
pub mod config;
pub mod context;
pub mod dsn;
pub mod level;
pub mod observability;
pub mod resilience;

pub use breadcrumbs::{Breadcrumb, NewBreadcrumb};
pub use client::{
    DispatchOutcome, ErrorPayload, EventKind, TelemetryClient, TelemetryClientBuilder,
    TelemetryError,
};
pub use config::{ClientConfig, ConfigError};
pub use context::RequestInfo;
pub use dsn::Dsn;
pub use level::Level;
pub use resilience::{CircuitState, CircuitStatus};
