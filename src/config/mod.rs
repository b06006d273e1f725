//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, TELEMETRY_* env overrides)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → TelemetryClient::builder(config)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the client is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Construction is the only place a telemetry error reaches the host

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BreadcrumbConfig;
pub use schema::BreakerConfig;
pub use schema::ClientConfig;
pub use schema::ContextConfig;
pub use validation::ValidationError;
