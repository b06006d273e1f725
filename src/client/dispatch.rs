//! Breaker-gated dispatch.
//!
//! # Data Flow
//! ```text
//! TelemetryEvent
//!     → breaker.allow_request()      (no → ShortCircuited)
//!     → serde_json::to_vec           (err → Skipped)
//!     → [spawn when async]           (→ Handed)
//!     → retry_with_backoff(transport.post)
//!     → 202 → record_success         (Delivered)
//!       other status → record_success, logged (Rejected)
//!       transport error → record_failure     (Failed)
//!       panic → record_failure                (Failed)
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use url::Url;

use crate::client::outcome::DispatchOutcome;
use crate::client::payload::{EncodingError, EventKind, TelemetryEvent};
use crate::client::transport::{HttpTransport, OutboundRequest, TransportError};
use crate::observability::logging::log_swallowed;
use crate::observability::metrics;
use crate::resilience::retries::{retry_with_backoff, Delay, RetryPolicy};
use crate::resilience::{CircuitBreaker, RequestTimeout};

/// Status the ingest service answers with on acceptance.
pub const ACCEPTED: u16 = 202;

pub(crate) struct Dispatcher {
    pub(crate) breaker: CircuitBreaker,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) delay: Arc<dyn Delay>,
    pub(crate) policy: RetryPolicy,
    pub(crate) timeout: RequestTimeout,
    pub(crate) api_key: String,
    pub(crate) async_dispatch: bool,
    pub(crate) debug: bool,
}

impl Dispatcher {
    /// Send `event` to `url`. Never panics out and never errors.
    pub(crate) async fn dispatch(self: &Arc<Self>, event: TelemetryEvent, url: Url) -> DispatchOutcome {
        let kind = event.kind;
        let outcome = AssertUnwindSafe(self.gate_and_send(event, url))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| self.panicked(kind));
        // Handed-off sends are counted by the background task.
        if !matches!(outcome, DispatchOutcome::Handed) {
            metrics::record_event(kind.as_str(), outcome.label());
        }
        outcome
    }

    async fn gate_and_send(self: &Arc<Self>, event: TelemetryEvent, url: Url) -> DispatchOutcome {
        if !self.breaker.allow_request() {
            tracing::debug!(
                kind = event.kind.as_str(),
                endpoint = %url,
                "Circuit breaker open, skipping send"
            );
            return DispatchOutcome::ShortCircuited;
        }

        let body = match serde_json::to_vec(&event.payload) {
            Ok(body) => body,
            Err(e) => {
                let err = EncodingError::from(e);
                log_swallowed!(self.debug, kind = event.kind.as_str(), error = %err, "Skipping unencodable payload");
                return DispatchOutcome::Skipped(err);
            }
        };

        if self.async_dispatch {
            if let Ok(handle) = Handle::try_current() {
                let this = Arc::clone(self);
                let kind = event.kind;
                handle.spawn(async move {
                    let outcome = AssertUnwindSafe(this.deliver(kind, url, body))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| this.panicked(kind));
                    metrics::record_event(kind.as_str(), outcome.label());
                });
                return DispatchOutcome::Handed;
            }
        }

        self.deliver(event.kind, url, body).await
    }

    /// A panicking send counts against the breaker like any other failure.
    fn panicked(&self, kind: EventKind) -> DispatchOutcome {
        tracing::error!(kind = kind.as_str(), "Telemetry send panicked");
        self.breaker.record_failure();
        DispatchOutcome::Failed {
            error: TransportError::Other("dispatch panicked".into()),
            attempts: 0,
        }
    }

    /// POST with retries, then feed the result back into the breaker.
    pub(crate) async fn deliver(&self, kind: EventKind, url: Url, body: Vec<u8>) -> DispatchOutcome {
        let retried = retry_with_backoff(
            &self.policy,
            self.delay.as_ref(),
            TransportError::is_retryable,
            |attempt| {
                tracing::trace!(kind = kind.as_str(), endpoint = %url, attempt, "Sending telemetry");
                self.transport.post(OutboundRequest {
                    url: url.clone(),
                    api_key: self.api_key.clone(),
                    body: body.clone(),
                    timeout: self.timeout.as_duration(),
                })
            },
        )
        .await;

        let attempts = retried.attempts;
        match retried.result {
            Ok(ACCEPTED) => {
                self.breaker.record_success();
                tracing::debug!(kind = kind.as_str(), attempts, "Telemetry delivered");
                DispatchOutcome::Delivered {
                    status: ACCEPTED,
                    attempts,
                }
            }
            Ok(status) => {
                // The service answered, so the transport is healthy.
                self.breaker.record_success();
                let err = TransportError::UnexpectedStatus(status);
                log_swallowed!(self.debug, kind = kind.as_str(), endpoint = %url, error = %err, "Telemetry not accepted");
                DispatchOutcome::Rejected { status, attempts }
            }
            Err(error) => {
                self.breaker.record_failure();
                log_swallowed!(self.debug, kind = kind.as_str(), endpoint = %url, attempts, error = %error, "Telemetry send failed");
                DispatchOutcome::Failed { error, attempts }
            }
        }
    }
}
