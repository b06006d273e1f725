//! DSN endpoint resolution.
//!
//! # Data Flow
//! ```text
//! "https://host:8111/proj-1"
//!     → parser.rs (strict parse: scheme, host, port, project id)
//!     → Endpoints
//!         ingest:          https://host:8111/api/errors/ingest
//!         sessions:        https://host:8111/api/v1/sessions
//!         session events:  https://host:8111/api/v1/sessions/{id}/events
//!         session end:     https://host:8111/api/v1/sessions/{id}/end
//! ```
//!
//! # Design Decisions
//! - Parse failure is a construction-time ConfigError, never a runtime one
//! - Project ids are percent-decoded so `generate` and `parse` round-trip

mod parser;

pub use parser::{Dsn, Endpoints};
