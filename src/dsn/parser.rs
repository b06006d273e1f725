//! DSN parsing and endpoint derivation.

use std::fmt;

use url::Url;

use crate::config::ConfigError;

const INGEST_PATH: &str = "/api/errors/ingest";
const SESSIONS_PATH: &str = "/api/v1/sessions";

/// A parsed data source name.
///
/// Immutable once parsed. The API key is configured separately and never
/// read from the DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    scheme: String,
    host: String,
    port: Option<u16>,
    project_id: String,
}

impl Dsn {
    /// Parse a DSN of the form `{scheme}://{host}[:port]/{project_id}`.
    ///
    /// Fails when the DSN is empty, is not an http(s) URL with a host, or the
    /// path is empty once leading and trailing slashes are trimmed.
    pub fn parse(dsn: &str) -> Result<Self, ConfigError> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(ConfigError::InvalidDsn("DSN is empty".to_string()));
        }

        let url = Url::parse(dsn)
            .map_err(|e| ConfigError::InvalidDsn(format!("'{}': {}", dsn, e)))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::InvalidDsn(format!(
                "'{}': unsupported scheme '{}'",
                dsn, scheme
            )));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(ConfigError::InvalidDsn(format!("'{}': missing host", dsn))),
        };

        let raw_project = url.path().trim_matches('/');
        if raw_project.is_empty() {
            return Err(ConfigError::InvalidDsn(format!(
                "'{}': missing project id",
                dsn
            )));
        }
        let project_id = urlencoding::decode(raw_project)
            .map_err(|e| ConfigError::InvalidDsn(format!("'{}': {}", dsn, e)))?
            .into_owned();

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port: url.port(),
            project_id,
        })
    }

    /// Build a DSN string from a base URL and a project id.
    ///
    /// Only the origin of `base` is kept; any path it carries is replaced.
    pub fn generate(base: &str, project_id: &str) -> Result<String, ConfigError> {
        if project_id.is_empty() {
            return Err(ConfigError::InvalidDsn("project id is empty".to_string()));
        }
        let mut url = Url::parse(base.trim())
            .map_err(|e| ConfigError::InvalidDsn(format!("'{}': {}", base, e)))?;
        url.set_path(&format!("/{}", urlencoding::encode(project_id)));
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `{scheme}://{host}[:port]`
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// The error ingestion endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url(), INGEST_PATH)
    }

    /// Derive every outbound endpoint.
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let base = self.base_url();
        let ingest = Url::parse(&format!("{}{}", base, INGEST_PATH))
            .map_err(|e| ConfigError::InvalidDsn(e.to_string()))?;
        let sessions = Url::parse(&format!("{}{}", base, SESSIONS_PATH))
            .map_err(|e| ConfigError::InvalidDsn(e.to_string()))?;
        Ok(Endpoints { ingest, sessions })
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_url(), urlencoding::encode(&self.project_id))
    }
}

/// Ingestion URLs derived from a [`Dsn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    ingest: Url,
    sessions: Url,
}

impl Endpoints {
    /// `POST` target for error events.
    pub fn ingest(&self) -> &Url {
        &self.ingest
    }

    /// `POST` target for session creation.
    pub fn sessions(&self) -> &Url {
        &self.sessions
    }

    /// `{sessions}/{id}/events`
    pub fn session_events(&self, session_id: &str) -> Url {
        self.session_path(session_id, "events")
    }

    /// `{sessions}/{id}/end`
    pub fn session_end(&self, session_id: &str) -> Url {
        self.session_path(session_id, "end")
    }

    // The id is pushed as a single segment, so `/` and `?` inside it are escaped.
    fn session_path(&self, session_id: &str, action: &str) -> Url {
        let mut url = self.sessions.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(session_id).push(action);
        }
        url
    }
}
