//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the telemetry client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the telemetry client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Master switch. A disabled client drops every event.
    pub enabled: bool,

    /// Data source name, e.g. `https://ingest.example.com/my-project`.
    pub dsn: String,

    /// Static API key sent as `X-Api-Key` on every request.
    pub api_key: String,

    /// Environment name attached to every event.
    pub environment: String,

    /// Release identifier attached to every event.
    pub release: Option<String>,

    /// Server name override. Falls back to the host name.
    pub server_name: Option<String>,

    /// Per-request timeout in seconds, in `[0.5, 5.0]`.
    pub timeout_secs: f64,

    /// Retries after the first attempt, on transport failures only.
    pub retry_attempts: u32,

    /// Hand requests to a background task instead of awaiting the response.
    pub async_dispatch: bool,

    /// Log swallowed failures at warn/error instead of debug.
    pub debug: bool,

    /// Circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Breadcrumb trail settings.
    pub breadcrumbs: BreadcrumbConfig,

    /// Context collection and scrubbing settings.
    pub context: ContextConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dsn: String::new(),
            api_key: String::new(),
            environment: "production".to_string(),
            release: None,
            server_name: None,
            timeout_secs: 2.0,
            retry_attempts: 2,
            async_dispatch: true,
            debug: false,
            breaker: BreakerConfig::default(),
            breadcrumbs: BreadcrumbConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// When false the breaker never opens and records nothing.
    pub enabled: bool,

    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before allowing trial calls.
    pub timeout_secs: u64,

    /// Trial calls permitted while half-open.
    pub max_half_open_attempts: u32,

    /// TTL for the persisted state entry.
    pub state_ttl_secs: u64,

    /// Key in the shared store. Derived from the project id when unset.
    pub store_key: Option<String>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout_secs: 60,
            max_half_open_attempts: 3,
            state_ttl_secs: 86_400,
            store_key: None,
        }
    }
}

/// Breadcrumb configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreadcrumbConfig {
    /// Ring capacity, in `[10, 100]`.
    pub max_breadcrumbs: usize,
}

impl Default for BreadcrumbConfig {
    fn default() -> Self {
        Self { max_breadcrumbs: 50 }
    }
}

/// Context collection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Field names redacted wherever they appear (case-insensitive substring match).
    pub sensitive_fields: Vec<String>,

    /// Zero the host part of client IP addresses.
    pub anonymize_ip: bool,

    /// Include submitted form/body data in the request context.
    pub capture_request_data: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            sensitive_fields: default_sensitive_fields(),
            anonymize_ip: true,
            capture_request_data: true,
        }
    }
}

fn default_sensitive_fields() -> Vec<String> {
    [
        "password",
        "passwd",
        "secret",
        "token",
        "api_key",
        "apikey",
        "authorization",
        "cookie",
        "credit_card",
        "card_number",
        "cvv",
        "ssn",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
