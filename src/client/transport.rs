//! HTTP transport.
//!
//! # Responsibilities
//! - POST an encoded body with the fixed header set and a per-request deadline
//! - Classify failures: connect, timeout, other
//!
//! # Design Decisions
//! - A completed response is `Ok(status)` whatever the status; judging it is the
//!   dispatcher's job
//! - The trait is the seam tests use to inject failures

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::ConfigError;

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// One outbound POST.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: Url,
    pub api_key: String,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

/// Failures delivering a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Network-level failures are retried; a completed response is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::UnexpectedStatus(_))
    }
}

/// Sends one request and reports the response status.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<u16, TransportError>;
}

/// Transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: OutboundRequest) -> Result<u16, TransportError> {
        let timeout = request.timeout;
        let response = self
            .client
            .post(request.url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-Api-Key", request.api_key)
            .body(request.body)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        Ok(response.status().as_u16())
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
