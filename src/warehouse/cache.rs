//! Query Cache - time-bounded memoization of query results
//!
//! Advisory only: a miss always recomputes from the warehouse.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Get-or-compute cache with a fixed expiry window.
/// A zero TTL disables storage entirely.
#[derive(Debug)]
pub struct QueryCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> QueryCache<V> {
    /// Default expiry window (one hour)
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key` if it is still fresh, otherwise run
    /// `compute` and store its successful result.
    pub fn get_or_compute<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if !self.is_enabled() {
            return compute();
        }

        if let Some(value) = self.lookup(key) {
            debug!("Cache hit: {}", key);
            return Ok(value);
        }

        debug!("Cache miss: {}", key);
        let value = compute()?;
        self.store(key, value.clone());
        Ok(value)
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: &str, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        if entries.len() < before {
            debug!("Evicted {} expired cache entries", before - entries.len());
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
