//! Bounded breadcrumb trail.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::validation::validate_breadcrumb_capacity;
use crate::config::ConfigError;
use crate::level::Level;
use crate::resilience::clock::Clock;

/// A recorded breadcrumb. Every field is filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub message: String,
    pub data: Map<String, Value>,
}

/// A breadcrumb as submitted; unset fields get defaults on insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBreadcrumb {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Option<Level>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub message: String,
    pub data: Option<Map<String, Value>>,
}

impl NewBreadcrumb {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    fn complete(self, now: DateTime<Utc>) -> Breadcrumb {
        Breadcrumb {
            timestamp: self.timestamp.unwrap_or(now),
            level: self.level.unwrap_or(Level::Info),
            kind: self.kind.unwrap_or_else(|| "default".to_string()),
            category: self.category.unwrap_or_else(|| "manual".to_string()),
            message: self.message,
            data: self.data.unwrap_or_default(),
        }
    }
}

/// Insertion-ordered ring that evicts its oldest entry past capacity.
pub struct BreadcrumbRing {
    max: usize,
    entries: Mutex<VecDeque<Breadcrumb>>,
    clock: Arc<dyn Clock>,
}

impl BreadcrumbRing {
    /// Capacity must lie in `[10, 100]`.
    pub fn new(max: usize, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if let Some(err) = validate_breadcrumb_capacity(max) {
            return Err(err.into());
        }
        Ok(Self {
            max,
            entries: Mutex::new(VecDeque::with_capacity(max + 1)),
            clock,
        })
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Append, filling defaults, then drop the oldest if over capacity.
    pub fn add(&self, entry: NewBreadcrumb) {
        let crumb = entry.complete(self.clock.now());
        let mut entries = self.lock();
        entries.push_back(crumb);
        while entries.len() > self.max {
            entries.pop_front();
        }
    }

    /// Snapshot in insertion order.
    pub fn get(&self) -> Vec<Breadcrumb> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave the deque inconsistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Breadcrumb>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for BreadcrumbRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreadcrumbRing")
            .field("max", &self.max)
            .field("len", &self.len())
            .finish()
    }
}
