//! Process-wide cache for compiled templates and rendered output.
//!
//! The pipeline talks to a [`CacheStore`], a namespaced key/value store with an
//! optional per-entry lifetime. Two namespaces are used:
//!
//! | Namespace | Key | Expiry |
//! |-----------|-----|--------|
//! | [`COMPILED_NAMESPACE`] | template identifier | none |
//! | [`RENDERED_NAMESPACE`] | content hash of compiled template + data | configurable |
//!
//! Stores are shared between concurrent requests. Reads and writes must be
//! individually atomic; two workers racing on the same miss both compute and
//! both write, and the last write wins. Cached values are pure functions of
//! their key, so that race only wastes work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Namespace for compiled template artifacts.
pub const COMPILED_NAMESPACE: &str = "trellis/partials";

/// Namespace for rendered output.
pub const RENDERED_NAMESPACE: &str = "trellis/rendered";

/// A namespaced key/value store with optional expiry.
pub trait CacheStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` on a miss or expiry.
    fn get(&self, key: &str, namespace: &str) -> Option<Vec<u8>>;

    /// Stores `value` under `key`. `None` means the entry never expires.
    fn set(&self, key: &str, value: Vec<u8>, namespace: &str, ttl: Option<Duration>);

    /// Drops every entry of `namespace`, or everything when `None`.
    fn clear(&self, namespace: Option<&str>);
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory [`CacheStore`] backed by a concurrent map.
///
/// Expired entries are evicted lazily when they are read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(String, String), Entry>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and not-yet-evicted entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `(hits, misses)` since creation.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str, namespace: &str) -> Option<Vec<u8>> {
        let map_key = (namespace.to_string(), key.to_string());
        let now = Instant::now();

        let found = match self.entries.get(&map_key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                // Re-check under the write lock; a concurrent set may have refreshed it.
                self.entries.remove_if(&map_key, |_, entry| entry.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, namespace: &str, ttl: Option<Duration>) {
        // A TTL past the clock's range never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(
            (namespace.to_string(), key.to_string()),
            Entry { value, expires_at },
        );
    }

    fn clear(&self, namespace: Option<&str>) {
        match namespace {
            Some(ns) => self.entries.retain(|(entry_ns, _), _| entry_ns != ns),
            None => self.entries.clear(),
        }
    }
}

/// A [`CacheStore`] that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheStore for NoopCache {
    fn get(&self, _key: &str, _namespace: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _namespace: &str, _ttl: Option<Duration>) {}

    fn clear(&self, _namespace: Option<&str>) {}
}
