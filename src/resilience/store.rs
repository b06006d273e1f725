//! Shared key-value store for breaker state.
//!
//! # Responsibilities
//! - Abstract the externally-owned store (cache server, shared memory, ...)
//! - Provide TTL semantics and a compare-and-swap primitive
//! - Ship an in-process implementation for single-process hosts and tests
//!
//! # Design Decisions
//! - Values are opaque strings; the breaker owns the encoding
//! - `compare_and_swap` has a non-atomic default so simple stores still work;
//!   stores with real atomicity override it

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

/// Failures talking to the backing store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// A shared key-value store with TTL semantics.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether the write happened.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let current = self.get(key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.set(key, new, ttl)?;
        Ok(true)
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process store backed by a concurrent map.
///
/// Clones share the same map, so several clients built from clones of one
/// store observe the same breaker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: std::sync::Arc<DashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.iter().filter(|r| r.value().is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let live = self
            .inner
            .get(key)
            .filter(|r| r.value().is_live())
            .map(|r| r.value().value.clone());
        if live.is_none() {
            self.inner.remove_if(key, |_, v| !v.is_live());
        }
        Ok(live)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }

    // Holds the shard lock for the whole read-compare-write.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let matches = {
                    let current = occupied.get();
                    let live = current.is_live().then_some(current.value.as_str());
                    live == expected
                };
                if matches {
                    occupied.insert(StoredValue::new(new, ttl));
                }
                Ok(matches)
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(StoredValue::new(new, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
