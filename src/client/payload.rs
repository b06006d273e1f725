//! Wire payloads.
//!
//! `ErrorPayload` is the body POSTed to the ingest endpoint. Session payloads
//! are free-form JSON objects and travel as `TelemetryEvent`s.

use std::error::Error as StdError;
use std::panic::Location;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::breadcrumbs::Breadcrumb;
use crate::context::Context;
use crate::level::Level;

/// Longest `message` sent, in chars.
pub const MAX_MESSAGE_CHARS: usize = 1000;
/// Longest `file` sent, in chars.
pub const MAX_FILE_CHARS: usize = 500;

/// Payload could not be encoded.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to encode payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must encode to a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("payload is missing string field '{0}'")]
    MissingField(&'static str),
}

/// What an event is, and so which endpoint it goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Error,
    SessionCreate,
    SessionEvent,
    SessionEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::SessionCreate => "session-create",
            EventKind::SessionEvent => "session-event",
            EventKind::SessionEnd => "session-end",
        }
    }
}

/// One host event on its way out. Built per call, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub kind: EventKind,
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Encode any serializable value as an event body.
    pub fn encode<P: Serialize + ?Sized>(
        kind: EventKind,
        payload: &P,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, EncodingError> {
        let payload = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => return Err(EncodingError::NotAnObject(json_type(&other))),
        };
        Ok(Self {
            kind,
            payload,
            timestamp,
        })
    }

    /// Insert `key` unless the host already set it.
    pub fn stamp(&mut self, key: &str, value: impl Into<Value>) {
        if !self.payload.contains_key(key) {
            self.payload.insert(key.to_string(), value.into());
        }
    }

    /// Stamp the event's own timestamp as RFC 3339.
    pub fn stamp_timestamp(&mut self, key: &str) {
        let ts = self.timestamp.to_rfc3339();
        self.stamp(key, ts);
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub in_app: bool,
}

impl StackFrame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: truncate(file.into(), MAX_FILE_CHARS),
            line: line.max(1),
            function: function.into(),
            module: None,
            in_app: true,
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn in_app(mut self, in_app: bool) -> Self {
        self.in_app = in_app;
        self
    }
}

/// Error report as accepted by the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub stack_trace: Vec<StackFrame>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<Vec<Breadcrumb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
}

impl ErrorPayload {
    /// Required fields only. `message` and `file` are truncated, `line` is
    /// raised to 1.
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: truncate(message.into(), MAX_MESSAGE_CHARS),
            file: truncate(file.into(), MAX_FILE_CHARS),
            line: line.max(1),
            stack_trace: Vec::new(),
            level: None,
            source: None,
            timestamp: None,
            environment: None,
            release: None,
            session_hash: None,
            server_name: None,
            url: None,
            http_method: None,
            ip_address: None,
            user_agent: None,
            runtime: None,
            breadcrumbs: None,
            request_data: None,
            context: None,
            tags: None,
        }
    }

    /// Report for `err` raised at `location`.
    ///
    /// The first frame is the call site; each error further down the source
    /// chain adds a frame named after its message, so the chain survives
    /// without a backtrace.
    pub fn from_error<E>(err: &E, location: &Location<'_>) -> Self
    where
        E: StdError + ?Sized,
    {
        let type_name = short_type_name(std::any::type_name::<E>());
        let mut payload = Self::new(type_name, err.to_string(), location.file(), location.line())
            .level(Level::Error)
            .source("error");

        payload.stack_trace.push(
            StackFrame::new(location.file(), location.line(), type_name)
                .module(module_of(location.file())),
        );
        let mut cause = err.source();
        while let Some(inner) = cause {
            payload.stack_trace.push(
                StackFrame::new(location.file(), location.line(), format!("caused by: {}", inner))
                    .in_app(false),
            );
            cause = inner.source();
        }
        payload
    }

    /// Report for a log record.
    pub fn from_message(level: Level, message: impl Into<String>, location: &Location<'_>) -> Self {
        Self::new("message", message, location.file(), location.line())
            .level(level)
            .source("log")
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn stack_frame(mut self, frame: StackFrame) -> Self {
        self.stack_trace.push(frame);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn breadcrumbs(mut self, breadcrumbs: Vec<Breadcrumb>) -> Self {
        if !breadcrumbs.is_empty() {
            self.breadcrumbs = Some(breadcrumbs);
        }
        self
    }

    /// Copy collected context into the flat request/user fields and keep the
    /// full tree under `context`. Fields already set win.
    pub fn with_context(mut self, context: &Context) -> Self {
        if let Some(request) = &context.request {
            self.url.get_or_insert_with(|| request.url.clone());
            self.http_method.get_or_insert_with(|| request.method.clone());
            if self.ip_address.is_none() {
                self.ip_address = request.ip_address.clone();
            }
            if self.user_agent.is_none() {
                self.user_agent = request.user_agent.clone();
            }
            if self.request_data.is_none() {
                self.request_data = request.data.clone();
            }
        }
        if self.session_hash.is_none() {
            self.session_hash = context.session_hash();
        }
        if self.server_name.is_none() {
            self.server_name = context.server.hostname.clone();
        }
        self.environment.get_or_insert_with(|| context.environment.clone());
        if self.release.is_none() {
            self.release = context.release.clone();
        }
        if self.context.is_none() {
            self.context = serde_json::to_value(context).ok();
        }
        self
    }
}

/// Cut `s` to at most `max` chars, never splitting a char.
pub fn truncate(mut s: String, max: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
    s
}

/// Apply the ingest limits to an already encoded error payload: `message`
/// and `file` are truncated, `line` is raised to 1, and stack frames get the
/// same `file` and `line` treatment.
pub fn enforce_limits(payload: &mut Map<String, Value>) {
    truncate_field(payload, "message", MAX_MESSAGE_CHARS);
    truncate_field(payload, "file", MAX_FILE_CHARS);
    clamp_line(payload);

    if let Some(Value::Array(frames)) = payload.get_mut("stack_trace") {
        for frame in frames.iter_mut() {
            if let Value::Object(frame) = frame {
                truncate_field(frame, "file", MAX_FILE_CHARS);
                clamp_line(frame);
            }
        }
    }
}

fn truncate_field(map: &mut Map<String, Value>, key: &str, max: usize) {
    if let Some(Value::String(s)) = map.get_mut(key) {
        if s.chars().count() > max {
            *s = truncate(std::mem::take(s), max);
        }
    }
}

fn clamp_line(map: &mut Map<String, Value>) {
    if let Some(line) = map.get_mut("line") {
        if line.as_i64().is_some_and(|n| n < 1) {
            *line = Value::from(1);
        }
    }
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn module_of(file: &str) -> String {
    file.trim_end_matches(".rs")
        .trim_start_matches("src/")
        .replace('/', "::")
}
