//! Request, server and user context collection.
//!
//! # Responsibilities
//! - Snapshot the in-flight request (url, method, query, headers, body, ip, agent)
//! - Describe the server (runtime, OS, host name)
//! - Describe the user from the host session, if one is active
//! - Scrub sensitive fields and anonymize addresses before anything leaves
//!
//! # Design Decisions
//! - Each section is built independently; a failing section is left out and
//!   the rest of the context is still returned

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::ContextConfig;
use crate::context::anonymize::{anonymize_ip, first_forwarded};
use crate::context::scrub::{Scrubber, REDACTED};
use crate::observability::logging::log_swallowed;
use crate::resilience::store::StoreError;

/// The request being handled, as the host sees it.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    pub query_string: Option<String>,
    /// Header name/value pairs; repeated names are joined with `, `.
    pub headers: Vec<(String, String)>,
    /// Submitted form or JSON body fields.
    pub data: Option<Value>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Host-owned session storage.
pub trait SessionStore: Send + Sync {
    /// Identifier of the active session, `None` when there is none.
    fn session_id(&self) -> Result<Option<String>, StoreError>;

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
}

/// Session store for hosts without sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

impl SessionStore for NoSession {
    fn session_id(&self) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestContext {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    pub headers: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerContext {
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    pub os: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserContext {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Everything collected for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub request: Option<RequestContext>,
    pub server: ServerContext,
    pub user: Option<UserContext>,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl Context {
    /// Hex SHA-256 of the session id, for the `session_hash` field.
    pub fn session_hash(&self) -> Option<String> {
        self.user.as_ref().map(|u| hash_session_id(&u.session_id))
    }
}

pub fn hash_session_id(session_id: &str) -> String {
    hex::encode(Sha256::digest(session_id.as_bytes()))
}

/// Builds [`Context`] values for one client instance.
pub struct ContextCollector {
    config: ContextConfig,
    scrubber: Scrubber,
    sessions: Arc<dyn SessionStore>,
    environment: String,
    release: Option<String>,
    server_name: Option<String>,
    debug: bool,
}

impl ContextCollector {
    pub fn new(
        config: ContextConfig,
        sessions: Arc<dyn SessionStore>,
        environment: impl Into<String>,
        release: Option<String>,
    ) -> Self {
        let scrubber = Scrubber::new(&config.sensitive_fields);
        Self {
            config,
            scrubber,
            sessions,
            environment: environment.into(),
            release,
            server_name: detect_hostname(),
            debug: false,
        }
    }

    /// Override the detected host name. `None` keeps the detected one.
    pub fn with_server_name(mut self, server_name: Option<String>) -> Self {
        if server_name.is_some() {
            self.server_name = server_name;
        }
        self
    }

    pub fn with_debug_logging(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }

    /// Assemble the context for an event raised while handling `request`.
    pub fn collect_context(&self, request: Option<&RequestInfo>) -> Context {
        let client_ip = request.and_then(|r| self.client_ip(r));
        Context {
            request: request.map(|r| self.request_context(r, client_ip.clone())),
            server: self.server_context(),
            user: self.user_context(client_ip),
            environment: self.environment.clone(),
            release: self.release.clone(),
        }
    }

    /// Host name reported as `server_name`, resolved once at construction.
    pub fn server_name(&self) -> Option<String> {
        self.server_name.clone()
    }

    fn request_context(&self, request: &RequestInfo, ip_address: Option<String>) -> RequestContext {
        let mut headers = Map::new();
        for (name, value) in &request.headers {
            let key = name.to_ascii_lowercase();
            match headers.get_mut(&key) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                _ => {
                    headers.insert(key, Value::from(value.as_str()));
                }
            }
        }
        self.scrubber.scrub_map(&mut headers);

        let data = if self.config.capture_request_data {
            request.data.clone().map(|d| self.scrubber.scrub(d))
        } else {
            None
        };

        RequestContext {
            url: request.url.clone(),
            method: request.method.to_uppercase(),
            query_string: request
                .query_string
                .as_deref()
                .filter(|q| !q.is_empty())
                .map(|q| self.scrub_query(q)),
            headers,
            data,
            ip_address,
            user_agent: request
                .user_agent
                .clone()
                .or_else(|| request.header_value("user-agent").map(str::to_string)),
        }
    }

    fn scrub_query(&self, query: &str) -> String {
        query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if self.scrubber.is_sensitive(key) => {
                    format!("{}={}", key, REDACTED)
                }
                _ => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn client_ip(&self, request: &RequestInfo) -> Option<String> {
        let raw = request
            .client_ip
            .as_deref()
            .or_else(|| request.header_value("x-forwarded-for").and_then(first_forwarded))
            .or_else(|| request.header_value("x-real-ip"))?;
        if self.config.anonymize_ip {
            anonymize_ip(raw)
        } else {
            Some(raw.trim().to_string())
        }
    }

    fn server_context(&self) -> ServerContext {
        ServerContext {
            runtime: "rust".to_string(),
            runtime_version: Some(env!("CARGO_PKG_RUST_VERSION").to_string())
                .filter(|v| !v.is_empty()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: self.server_name(),
        }
    }

    fn user_context(&self, ip_address: Option<String>) -> Option<UserContext> {
        let session_id = match self.sessions.session_id() {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => return None,
            Err(e) => {
                log_swallowed!(self.debug, error = %e, "Session store failed; omitting user context");
                return None;
            }
        };
        let id = match self.sessions.get("user_id") {
            Ok(id) => id.filter(|v| !v.is_null()),
            Err(e) => {
                log_swallowed!(self.debug, error = %e, "Session store failed reading user id");
                None
            }
        };
        Some(UserContext {
            session_id,
            id,
            ip_address,
        })
    }
}

impl std::fmt::Debug for ContextCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCollector")
            .field("environment", &self.environment)
            .field("release", &self.release)
            .field("anonymize_ip", &self.config.anonymize_ip)
            .finish()
    }
}

fn detect_hostname() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
