//! The public telemetry client.

use std::error::Error as StdError;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::breadcrumbs::{Breadcrumb, BreadcrumbRing, NewBreadcrumb};
use crate::client::dispatch::Dispatcher;
use crate::client::outcome::DispatchOutcome;
use crate::client::payload::{enforce_limits, EncodingError, ErrorPayload, EventKind, TelemetryEvent};
use crate::client::transport::{HttpTransport, ReqwestTransport};
use crate::config::validation::validate_config;
use crate::config::{ClientConfig, ConfigError};
use crate::context::{Context, ContextCollector, NoSession, RequestInfo, SessionStore};
use crate::dsn::{Dsn, Endpoints};
use crate::level::Level;
use crate::observability::logging::log_swallowed;
use crate::observability::metrics;
use crate::resilience::{
    CircuitBreaker, CircuitState, Clock, Delay, InMemoryStore, RequestTimeout, RetryPolicy,
    StateStore, SystemClock, TokioDelay,
};

/// Store key used when `breaker.store_key` is unset.
pub fn default_store_key(project_id: &str) -> String {
    format!("telemetry_guard:breaker:{}", project_id)
}

/// Reports errors and session activity to the ingestion service.
///
/// Cheap to clone; clones share the breadcrumb trail and breaker. None of the
/// send operations can fail or panic into the caller.
#[derive(Clone)]
pub struct TelemetryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    dsn: Dsn,
    endpoints: Endpoints,
    dispatcher: Arc<Dispatcher>,
    breadcrumbs: BreadcrumbRing,
    collector: ContextCollector,
    clock: Arc<dyn Clock>,
}

/// Wires a [`TelemetryClient`] to its collaborators.
///
/// Anything not supplied gets the production default: an in-process breaker
/// store, the system clock, tokio sleeps, a reqwest transport and no session.
pub struct TelemetryClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn StateStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Option<Arc<dyn Clock>>,
    delay: Option<Arc<dyn Delay>>,
    sessions: Option<Arc<dyn SessionStore>>,
}

impl TelemetryClientBuilder {
    /// Shared store for breaker state. Pass the same store to every client
    /// that should trip together.
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Validate the config and assemble the client. This is the only place a
    /// telemetry error reaches the host.
    pub fn build(self) -> Result<TelemetryClient, ConfigError> {
        let config = self.config;
        validate_config(&config).map_err(ConfigError::Validation)?;

        let dsn = Dsn::parse(&config.dsn)?;
        let endpoints = dsn.endpoints()?;
        let timeout = RequestTimeout::from_secs_f64(config.timeout_secs)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let key = config
            .breaker
            .store_key
            .clone()
            .unwrap_or_else(|| default_store_key(dsn.project_id()));
        let breaker = CircuitBreaker::new(config.breaker.clone(), key, store, Arc::clone(&clock))?
            .with_debug_logging(config.debug);

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let policy = RetryPolicy::new(config.retry_attempts);
        let worst_case = timeout.worst_case(&policy);
        let dispatcher = Arc::new(Dispatcher {
            breaker,
            transport,
            delay: self.delay.unwrap_or_else(|| Arc::new(TokioDelay)),
            policy,
            timeout,
            api_key: config.api_key.clone(),
            async_dispatch: config.async_dispatch,
            debug: config.debug,
        });

        let breadcrumbs =
            BreadcrumbRing::new(config.breadcrumbs.max_breadcrumbs, Arc::clone(&clock))?;
        let collector = ContextCollector::new(
            config.context.clone(),
            self.sessions.unwrap_or_else(|| Arc::new(NoSession)),
            config.environment.clone(),
            config.release.clone(),
        )
        .with_server_name(config.server_name.clone())
        .with_debug_logging(config.debug);

        tracing::debug!(
            endpoint = %endpoints.ingest(),
            project_id = dsn.project_id(),
            enabled = config.enabled,
            async_dispatch = config.async_dispatch,
            worst_case_ms = worst_case.as_millis() as u64,
            "Telemetry client ready"
        );

        Ok(TelemetryClient {
            inner: Arc::new(ClientInner {
                config,
                dsn,
                endpoints,
                dispatcher,
                breadcrumbs,
                collector,
                clock,
            }),
        })
    }
}

impl TelemetryClient {
    pub fn builder(config: ClientConfig) -> TelemetryClientBuilder {
        TelemetryClientBuilder {
            config,
            store: None,
            transport: None,
            clock: None,
            delay: None,
            sessions: None,
        }
    }

    /// Client with every collaborator defaulted.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn dsn(&self) -> &Dsn {
        &self.inner.dsn
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Report an error payload to the ingest endpoint.
    ///
    /// Any serializable value works as long as it encodes to a JSON object;
    /// [`ErrorPayload`] is the typed form. Missing `timestamp`, `environment`,
    /// `release`, `server_name` and `runtime` fields are filled in. Sensitive
    /// keys are redacted and `message`, `file` and `line` are held to the
    /// ingest limits.
    pub async fn send_error<P: Serialize + ?Sized>(&self, payload: &P) {
        self.try_send_error(payload).await;
    }

    /// Open a session.
    pub async fn create_session<P: Serialize + ?Sized>(&self, data: &P) {
        self.try_create_session(data).await;
    }

    /// Append an event to an open session.
    pub async fn add_session_event<P: Serialize + ?Sized>(&self, session_id: &str, data: &P) {
        self.try_add_session_event(session_id, data).await;
    }

    /// Close a session. `ended_at` defaults to now.
    pub async fn end_session(&self, session_id: &str, ended_at: Option<DateTime<Utc>>) {
        self.try_end_session(session_id, ended_at).await;
    }

    /// Entry point for host integrations that already hold a raw event.
    ///
    /// Session events and session ends read the id from the payload's
    /// `session_id` field; an end may carry an RFC 3339 `ended_at`.
    pub async fn submit_event(&self, kind: EventKind, payload: Map<String, Value>) {
        self.try_submit_event(kind, payload).await;
    }

    /// Report `err`, with breadcrumbs and context, attributed to the caller.
    #[track_caller]
    pub fn capture_error<'a, E>(
        &'a self,
        err: &'a E,
        request: Option<&'a RequestInfo>,
    ) -> impl Future<Output = ()> + 'a
    where
        E: StdError + ?Sized,
    {
        let payload = ErrorPayload::from_error(err, Location::caller());
        async move {
            self.capture(payload, request).await;
        }
    }

    /// Report a log record, with breadcrumbs and context, attributed to the caller.
    #[track_caller]
    pub fn capture_message<'a>(
        &'a self,
        level: Level,
        message: impl Into<String>,
        request: Option<&'a RequestInfo>,
    ) -> impl Future<Output = ()> + 'a {
        let payload = ErrorPayload::from_message(level, message, Location::caller());
        async move {
            self.capture(payload, request).await;
        }
    }

    pub fn add_breadcrumb(&self, breadcrumb: NewBreadcrumb) {
        self.inner.breadcrumbs.add(breadcrumb);
    }

    /// Snapshot of the trail, oldest first.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.inner.breadcrumbs.get()
    }

    pub fn clear_breadcrumbs(&self) {
        self.inner.breadcrumbs.clear();
    }

    pub fn collect_context(&self, request: Option<&RequestInfo>) -> Context {
        self.inner.collector.collect_context(request)
    }

    /// Current breaker state, for health and monitoring surfaces.
    pub fn breaker_state(&self) -> CircuitState {
        self.inner.dispatcher.breaker.state()
    }

    pub fn reset_breaker(&self) {
        self.inner.dispatcher.breaker.reset();
    }

    pub(crate) async fn try_send_error<P: Serialize + ?Sized>(&self, payload: &P) -> DispatchOutcome {
        if !self.is_enabled() {
            return DispatchOutcome::Disabled;
        }
        let mut event = match self.encode(EventKind::Error, payload) {
            Ok(event) => event,
            Err(outcome) => return outcome,
        };
        enforce_limits(&mut event.payload);
        self.stamp_defaults(&mut event);
        let url = self.inner.endpoints.ingest().clone();
        self.inner.dispatcher.dispatch(event, url).await
    }

    pub(crate) async fn try_create_session<P: Serialize + ?Sized>(&self, data: &P) -> DispatchOutcome {
        let url = self.inner.endpoints.sessions().clone();
        self.send_session(EventKind::SessionCreate, data, url).await
    }

    pub(crate) async fn try_add_session_event<P: Serialize + ?Sized>(
        &self,
        session_id: &str,
        data: &P,
    ) -> DispatchOutcome {
        let url = self.inner.endpoints.session_events(session_id);
        self.send_session(EventKind::SessionEvent, data, url).await
    }

    pub(crate) async fn try_end_session(
        &self,
        session_id: &str,
        ended_at: Option<DateTime<Utc>>,
    ) -> DispatchOutcome {
        let ended_at = ended_at.unwrap_or_else(|| self.inner.clock.now());
        let mut body = Map::new();
        body.insert("ended_at".to_string(), Value::from(ended_at.to_rfc3339()));
        let url = self.inner.endpoints.session_end(session_id);
        self.send_session(EventKind::SessionEnd, &body, url).await
    }

    pub(crate) async fn try_submit_event(
        &self,
        kind: EventKind,
        mut payload: Map<String, Value>,
    ) -> DispatchOutcome {
        match kind {
            EventKind::Error => self.try_send_error(&payload).await,
            EventKind::SessionCreate => self.try_create_session(&payload).await,
            EventKind::SessionEvent => match take_session_id(&mut payload) {
                Some(id) => self.try_add_session_event(&id, &payload).await,
                None => self.skip(kind, EncodingError::MissingField("session_id")),
            },
            EventKind::SessionEnd => match take_session_id(&mut payload) {
                Some(id) => {
                    let ended_at = payload
                        .get("ended_at")
                        .and_then(Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc));
                    self.try_end_session(&id, ended_at).await
                }
                None => self.skip(kind, EncodingError::MissingField("session_id")),
            },
        }
    }

    async fn capture(&self, payload: ErrorPayload, request: Option<&RequestInfo>) -> DispatchOutcome {
        if !self.is_enabled() {
            return DispatchOutcome::Disabled;
        }
        let context = self.inner.collector.collect_context(request);
        let payload = payload
            .breadcrumbs(self.inner.breadcrumbs.get())
            .with_context(&context);
        self.try_send_error(&payload).await
    }

    async fn send_session<P: Serialize + ?Sized>(
        &self,
        kind: EventKind,
        data: &P,
        url: Url,
    ) -> DispatchOutcome {
        if !self.is_enabled() {
            return DispatchOutcome::Disabled;
        }
        let mut event = match self.encode(kind, data) {
            Ok(event) => event,
            Err(outcome) => return outcome,
        };
        event.stamp_timestamp("timestamp");
        self.inner.dispatcher.dispatch(event, url).await
    }

    fn encode<P: Serialize + ?Sized>(
        &self,
        kind: EventKind,
        payload: &P,
    ) -> Result<TelemetryEvent, DispatchOutcome> {
        let mut event = TelemetryEvent::encode(kind, payload, self.inner.clock.now())
            .map_err(|e| self.skip(kind, e))?;
        // Host payloads go out through the same redaction as collected context.
        self.inner.collector.scrubber().scrub_map(&mut event.payload);
        Ok(event)
    }

    fn skip(&self, kind: EventKind, err: EncodingError) -> DispatchOutcome {
        log_swallowed!(self.inner.config.debug, kind = kind.as_str(), error = %err, "Skipping telemetry event");
        let outcome = DispatchOutcome::Skipped(err);
        metrics::record_event(kind.as_str(), outcome.label());
        outcome
    }

    fn stamp_defaults(&self, event: &mut TelemetryEvent) {
        let config = &self.inner.config;
        event.stamp_timestamp("timestamp");
        event.stamp("environment", config.environment.as_str());
        if let Some(release) = &config.release {
            event.stamp("release", release.as_str());
        }
        if let Some(server_name) = self.inner.collector.server_name() {
            event.stamp("server_name", server_name);
        }
        event.stamp("runtime", "rust");
    }
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("dsn", &self.inner.dsn)
            .field("enabled", &self.inner.config.enabled)
            .field("breaker_key", &self.inner.dispatcher.breaker.key())
            .finish()
    }
}

fn take_session_id(payload: &mut Map<String, Value>) -> Option<String> {
    match payload.remove("session_id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{OutboundRequest, TransportError};
    use crate::resilience::{CircuitStatus, ManualClock, StoreError};
    use async_trait::async_trait;
    use serde::ser::Error as _;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted results, then answers 202.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16, TransportError>>>,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        fn with(script: Vec<Result<u16, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<OutboundRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post(&self, request: OutboundRequest) -> Result<u16, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(202))
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("redis down".into()))
        }
        fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("redis down".into()))
        }
        fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("redis down".into()))
        }
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot encode"))
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl HttpTransport for PanickingTransport {
        async fn post(&self, _: OutboundRequest) -> Result<u16, TransportError> {
            panic!("transport blew up")
        }
    }

    fn config() -> ClientConfig {
        let mut config = ClientConfig {
            dsn: "https://localhost:8111/proj-1".into(),
            api_key: "key-123".into(),
            release: Some("2.0.0".into()),
            server_name: Some("web-1".into()),
            async_dispatch: false,
            ..ClientConfig::default()
        };
        config.breaker.failure_threshold = 3;
        config
    }

    fn client_with(
        config: ClientConfig,
        transport: Arc<ScriptedTransport>,
        delay: Arc<RecordingDelay>,
    ) -> TelemetryClient {
        TelemetryClient::builder(config)
            .transport(transport)
            .delay(delay)
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap()
    }

    fn client(transport: Arc<ScriptedTransport>) -> TelemetryClient {
        client_with(config(), transport, Arc::new(RecordingDelay::default()))
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let mut bad = config();
        bad.timeout_secs = 10.0;
        bad.dsn = String::new();
        let err = TelemetryClient::builder(bad).build().unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_default_store_key() {
        let client = client(ScriptedTransport::with(vec![]));
        assert_eq!(
            client.inner.dispatcher.breaker.key(),
            "telemetry_guard:breaker:proj-1"
        );
    }

    #[tokio::test]
    async fn test_send_error_stamps_defaults() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));

        let outcome = client
            .try_send_error(&ErrorPayload::new("RuntimeError", "boom", "src/app.rs", 3))
            .await;
        assert!(outcome.is_delivered());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.as_str(), "https://localhost:8111/api/errors/ingest");
        assert_eq!(requests[0].api_key, "key-123");
        assert_eq!(requests[0].timeout, Duration::from_secs(2));

        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["type"], "RuntimeError");
        assert_eq!(body["environment"], "production");
        assert_eq!(body["release"], "2.0.0");
        assert_eq!(body["server_name"], "web-1");
        assert_eq!(body["runtime"], "rust");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_retries_transport_failures_with_backoff() {
        let transport = ScriptedTransport::with(vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Timeout(Duration::from_secs(2))),
        ]);
        let delay = Arc::new(RecordingDelay::default());
        let client = client_with(config(), Arc::clone(&transport), Arc::clone(&delay));

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;

        assert!(matches!(outcome, DispatchOutcome::Delivered { status: 202, attempts: 3 }));
        assert_eq!(
            *delay.waits.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(client.breaker_state().failure_count, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_one_breaker_failure() {
        let transport = ScriptedTransport::with(vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
        ]);
        let client = client(Arc::clone(&transport));

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;

        assert!(matches!(outcome, DispatchOutcome::Failed { attempts: 3, .. }));
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(client.breaker_state().failure_count, 1);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_not_retried_or_penalized() {
        let transport = ScriptedTransport::with(vec![Ok(500)]);
        let client = client(Arc::clone(&transport));
        client.inner.dispatcher.breaker.record_failure();

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;

        assert!(matches!(outcome, DispatchOutcome::Rejected { status: 500, attempts: 1 }));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(client.breaker_state().failure_count, 0);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));
        for _ in 0..3 {
            client.inner.dispatcher.breaker.record_failure();
        }
        assert_eq!(client.breaker_state().status, CircuitStatus::Open);

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;

        assert!(matches!(outcome, DispatchOutcome::ShortCircuited));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_encoding_failure_is_skipped_without_penalty() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));

        let outcome = client.try_send_error(&Unencodable).await;
        assert!(matches!(outcome, DispatchOutcome::Skipped(EncodingError::Json(_))));

        let outcome = client.try_send_error(&"just a string").await;
        assert!(matches!(outcome, DispatchOutcome::Skipped(EncodingError::NotAnObject("string"))));

        assert!(transport.requests().is_empty());
        assert_eq!(client.breaker_state().failure_count, 0);
    }

    #[tokio::test]
    async fn test_broken_store_still_sends() {
        let transport = ScriptedTransport::with(vec![Err(TransportError::Other("reset".into()))]);
        let client = TelemetryClient::builder(config())
            .transport(Arc::clone(&transport) as Arc<dyn HttpTransport>)
            .delay(Arc::new(RecordingDelay::default()))
            .store(Arc::new(BrokenStore))
            .build()
            .unwrap();

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;

        assert!(outcome.is_delivered());
        assert_eq!(client.breaker_state(), CircuitState::default());
    }

    #[tokio::test]
    async fn test_session_endpoints() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));
        let ended = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        client.try_create_session(&json!({ "user": 1 })).await;
        client.try_add_session_event("abc/1", &json!({ "name": "click" })).await;
        client.try_end_session("abc", Some(ended)).await;

        let requests = transport.requests();
        let urls: Vec<_> = requests.iter().map(|r| r.url.as_str().to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://localhost:8111/api/v1/sessions",
                "https://localhost:8111/api/v1/sessions/abc%2F1/events",
                "https://localhost:8111/api/v1/sessions/abc/end",
            ]
        );

        let end: Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(end["ended_at"], "2024-05-01T10:00:00+00:00");
        let create: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(create["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_submit_event_routes_by_kind() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));

        let mut payload = Map::new();
        payload.insert("session_id".into(), json!("s-1"));
        payload.insert("name".into(), json!("view"));
        let outcome = client.try_submit_event(EventKind::SessionEvent, payload).await;
        assert!(outcome.is_delivered());

        let outcome = client
            .try_submit_event(EventKind::SessionEnd, Map::new())
            .await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped(EncodingError::MissingField("session_id"))
        ));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.path().ends_with("/sessions/s-1/events"));
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("session_id").is_none());
    }

    #[tokio::test]
    async fn test_disabled_client_drops_everything() {
        let transport = ScriptedTransport::with(vec![]);
        let mut config = config();
        config.enabled = false;
        let client = client_with(config, Arc::clone(&transport), Arc::new(RecordingDelay::default()));

        assert!(matches!(
            client.try_send_error(&json!({})).await,
            DispatchOutcome::Disabled
        ));
        client.create_session(&json!({})).await;
        client.end_session("s", None).await;
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_async_mode_hands_off() {
        let transport = ScriptedTransport::with(vec![]);
        let mut config = config();
        config.async_dispatch = true;
        let client = client_with(config, Arc::clone(&transport), Arc::new(RecordingDelay::default()));

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;
        assert!(matches!(outcome, DispatchOutcome::Handed));

        for _ in 0..50 {
            if !transport.requests().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_error_attaches_breadcrumbs_and_context() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));
        client.add_breadcrumb(NewBreadcrumb::new("loaded cart"));

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let request = RequestInfo::new("post", "https://shop.test/pay")
            .header("Authorization", "Bearer x");
        client.capture_error(&err, Some(&request)).await;

        let requests = transport.requests();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["type"], "Error");
        assert_eq!(body["message"], "disk full");
        assert!(body["file"].as_str().unwrap().ends_with("telemetry.rs"));
        assert_eq!(body["breadcrumbs"][0]["message"], "loaded cart");
        assert_eq!(body["url"], "https://shop.test/pay");
        assert_eq!(body["http_method"], "POST");
        assert_eq!(body["context"]["request"]["headers"]["authorization"], "[REDACTED]");
    }

    #[tokio::test]
    async fn test_breadcrumb_data_is_scrubbed() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));
        let mut data = Map::new();
        data.insert("username".into(), json!("ana"));
        data.insert("password".into(), json!("hunter2"));
        client.add_breadcrumb(crate::breadcrumbs::builders::user_action("login", data));

        let err = std::io::Error::new(std::io::ErrorKind::Other, "login failed");
        client.capture_error(&err, None).await;

        let raw = String::from_utf8(transport.requests()[0].body.clone()).unwrap();
        assert!(!raw.contains("hunter2"));
        let body: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(body["breadcrumbs"][0]["data"]["password"], "[REDACTED]");
        assert_eq!(body["breadcrumbs"][0]["data"]["username"], "ana");
    }

    #[tokio::test]
    async fn test_host_payloads_are_scrubbed() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));

        let payload = ErrorPayload::new("E", "m", "src/a.rs", 1)
            .tag("api_key", "sk-live-1")
            .tag("region", "eu");
        let mut payload = serde_json::to_value(&payload).unwrap();
        payload["request_data"] = json!({ "user": { "Password": "hunter2", "name": "ana" } });
        client.try_send_error(&payload).await;
        client
            .try_create_session(&json!({ "user": 1, "auth": { "session_token": "tok-9" } }))
            .await;

        let requests = transport.requests();
        let error: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(error["request_data"]["user"]["Password"], "[REDACTED]");
        assert_eq!(error["request_data"]["user"]["name"], "ana");
        assert_eq!(error["tags"]["api_key"], "[REDACTED]");
        assert_eq!(error["tags"]["region"], "eu");

        let session: Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(session["auth"]["session_token"], "[REDACTED]");
        assert_eq!(session["user"], 1);
    }

    #[tokio::test]
    async fn test_raw_error_payload_gets_field_limits() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));

        client
            .try_send_error(&json!({
                "type": "E",
                "message": "x".repeat(1500),
                "file": "f".repeat(800),
                "line": 0,
            }))
            .await;

        let body: Value = serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert_eq!(body["message"].as_str().unwrap().chars().count(), 1000);
        assert_eq!(body["file"].as_str().unwrap().chars().count(), 500);
        assert_eq!(body["line"], 1);
    }

    #[tokio::test]
    async fn test_panicking_send_counts_as_breaker_failure() {
        let client = TelemetryClient::builder(config())
            .transport(Arc::new(PanickingTransport))
            .delay(Arc::new(RecordingDelay::default()))
            .build()
            .unwrap();

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;

        assert!(matches!(outcome, DispatchOutcome::Failed { attempts: 0, .. }));
        assert_eq!(client.breaker_state().failure_count, 1);
    }

    #[tokio::test]
    async fn test_panicking_background_send_counts_as_breaker_failure() {
        let mut config = config();
        config.async_dispatch = true;
        let client = TelemetryClient::builder(config)
            .transport(Arc::new(PanickingTransport))
            .delay(Arc::new(RecordingDelay::default()))
            .build()
            .unwrap();

        let outcome = client.try_send_error(&json!({ "type": "E" })).await;
        assert!(matches!(outcome, DispatchOutcome::Handed));

        for _ in 0..50 {
            if client.breaker_state().failure_count > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(client.breaker_state().failure_count, 1);
    }

    #[tokio::test]
    async fn test_capture_message_uses_level() {
        let transport = ScriptedTransport::with(vec![]);
        let client = client(Arc::clone(&transport));

        client.capture_message(Level::Warning, "disk almost full", None).await;

        let body: Value = serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert_eq!(body["level"], "warning");
        assert_eq!(body["type"], "message");
        assert_eq!(body["source"], "log");
    }

    #[test]
    fn test_breadcrumb_passthrough() {
        let client = client(ScriptedTransport::with(vec![]));
        client.add_breadcrumb(NewBreadcrumb::new("a"));
        client.add_breadcrumb(NewBreadcrumb::new("b"));
        assert_eq!(client.breadcrumbs().len(), 2);

        client.clear_breadcrumbs();
        assert!(client.breadcrumbs().is_empty());
    }
}
