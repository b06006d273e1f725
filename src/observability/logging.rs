//! Structured logging.
//!
//! # Responsibilities
//! - Initialize a logging subsystem for binaries (the library never does)
//! - Route swallowed failures to warn or debug depending on the debug flag
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Log level configurable via `RUST_LOG`, falling back to the given filter

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "telemetry_guard=info";

/// Install a global fmt subscriber. A second call is a no-op.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Log a failure that is being swallowed: `warn` when the debug flag is set,
/// `debug` otherwise.
macro_rules! log_swallowed {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::warn!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

pub(crate) use log_swallowed;
