//! Dispatch outcomes and the crate-wide error type.

use thiserror::Error;

use crate::client::payload::EncodingError;
use crate::client::transport::TransportError;
use crate::config::ConfigError;
use crate::resilience::StoreError;

/// How one send ended. Public send operations log this and drop it.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The ingest service answered 202.
    Delivered { status: u16, attempts: u32 },
    /// The service answered with some other status. Logged, not penalized.
    Rejected { status: u16, attempts: u32 },
    /// The breaker refused the call; nothing touched the network.
    ShortCircuited,
    /// The payload could not be encoded; nothing touched the network.
    Skipped(EncodingError),
    /// Every attempt failed at the transport level.
    Failed {
        error: TransportError,
        attempts: u32,
    },
    /// Handed to a background task (fire-and-forget).
    Handed,
    /// The client is disabled.
    Disabled,
}

impl DispatchOutcome {
    /// Label used for the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered { .. } => "delivered",
            DispatchOutcome::Rejected { .. } => "rejected",
            DispatchOutcome::ShortCircuited => "short_circuited",
            DispatchOutcome::Skipped(_) => "skipped",
            DispatchOutcome::Failed { .. } => "failed",
            DispatchOutcome::Handed => "handed",
            DispatchOutcome::Disabled => "disabled",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    /// Network attempts made, zero when none were.
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchOutcome::Delivered { attempts, .. }
            | DispatchOutcome::Rejected { attempts, .. }
            | DispatchOutcome::Failed { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// Any error this crate can produce, for hosts that want a single type.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
