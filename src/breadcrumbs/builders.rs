//! Convenience constructors for common breadcrumb shapes.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::breadcrumbs::ring::NewBreadcrumb;
use crate::level::Level;

/// Calls slower than this are flagged as warnings.
const SLOW_THRESHOLD: Duration = Duration::from_secs(1);

fn severity(status: Option<u16>, duration: Option<Duration>) -> Level {
    let failed = status.is_some_and(|s| s >= 400);
    let slow = duration.is_some_and(|d| d > SLOW_THRESHOLD);
    if failed || slow {
        Level::Warning
    } else {
        Level::Info
    }
}

fn duration_ms(duration: Duration) -> Value {
    Value::from((duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0)
}

/// An outbound or inbound HTTP request.
pub fn http_request(
    method: &str,
    url: &str,
    status: Option<u16>,
    duration: Option<Duration>,
) -> NewBreadcrumb {
    let mut data = Map::new();
    data.insert("method".into(), Value::from(method.to_uppercase()));
    data.insert("url".into(), Value::from(url));
    if let Some(status) = status {
        data.insert("status_code".into(), Value::from(status));
    }
    if let Some(duration) = duration {
        data.insert("duration_ms".into(), duration_ms(duration));
    }

    NewBreadcrumb::new(format!("{} {}", method.to_uppercase(), url))
        .kind("http")
        .category("http")
        .level(severity(status, duration))
        .data(data)
}

/// A database query.
pub fn query(sql: &str, duration: Option<Duration>, connection: Option<&str>) -> NewBreadcrumb {
    let mut data = Map::new();
    if let Some(duration) = duration {
        data.insert("duration_ms".into(), duration_ms(duration));
    }
    if let Some(connection) = connection {
        data.insert("connection".into(), Value::from(connection));
    }

    NewBreadcrumb::new(sql)
        .kind("query")
        .category("db.query")
        .level(severity(None, duration))
        .data(data)
}

/// A route or page change.
pub fn navigation(from: &str, to: &str) -> NewBreadcrumb {
    let mut data = Map::new();
    data.insert("from".into(), Value::from(from));
    data.insert("to".into(), Value::from(to));

    NewBreadcrumb::new(format!("{} -> {}", from, to))
        .kind("navigation")
        .category("navigation")
        .data(data)
}

/// Something the user did.
pub fn user_action(action: &str, data: Map<String, Value>) -> NewBreadcrumb {
    NewBreadcrumb::new(action)
        .kind("user")
        .category("user.action")
        .data(data)
}
