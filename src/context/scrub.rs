//! Recursive redaction of sensitive fields.

use serde_json::{Map, Value};

/// Replacement for any redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Nesting beyond this depth is replaced wholesale.
const MAX_DEPTH: usize = 64;

/// Redacts values whose key contains a sensitive name, case-insensitively,
/// at any depth of maps and lists.
#[derive(Debug, Clone)]
pub struct Scrubber {
    needles: Vec<String>,
}

impl Scrubber {
    pub fn new<S: AsRef<str>>(sensitive_fields: &[S]) -> Self {
        let needles = sensitive_fields
            .iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        Self { needles }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.needles.iter().any(|needle| key.contains(needle.as_str()))
    }

    /// Scrub a value tree, returning the redacted copy.
    pub fn scrub(&self, mut value: Value) -> Value {
        self.scrub_in_place(&mut value);
        value
    }

    pub fn scrub_in_place(&self, value: &mut Value) {
        self.walk(value, 0);
    }

    pub fn scrub_map(&self, map: &mut Map<String, Value>) {
        self.walk_map(map, 0);
    }

    fn walk(&self, value: &mut Value, depth: usize) {
        if depth >= MAX_DEPTH {
            if value.is_object() || value.is_array() {
                *value = Value::from(REDACTED);
            }
            return;
        }
        match value {
            Value::Object(map) => self.walk_map(map, depth),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.walk(item, depth + 1);
                }
            }
            _ => {}
        }
    }

    fn walk_map(&self, map: &mut Map<String, Value>, depth: usize) {
        for (key, child) in map.iter_mut() {
            if self.is_sensitive(key) {
                *child = Value::from(REDACTED);
            } else {
                self.walk(child, depth + 1);
            }
        }
    }
}
