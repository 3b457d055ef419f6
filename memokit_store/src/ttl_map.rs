//! In-memory TTL map backed by `DashMap` for concurrent access.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// A single stored value with its expiration time.
struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe in-memory map with a per-entry time-to-live.
///
/// An entry is visible only while `now < expires_at`. Expired entries are
/// lazily evicted on the next `get` for that key, or all at once by
/// [`TtlMap::sweep`]. Capacity is unbounded: a caller that keeps inserting
/// unique keys without sweeping grows memory without limit.
pub struct TtlMap<V> {
    store: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> TtlMap<V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// Returns the value for `key`, or `None` if missing or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.store.get(key)?;
        if entry.is_expired(Instant::now()) {
            drop(entry);
            self.store
                .remove_if(key, |_, e| e.is_expired(Instant::now()));
            return None;
        }
        Some(entry.value.clone())
    }

    /// Inserts or overwrites an entry expiring after `ttl`, returning the stored value.
    ///
    /// A `ttl` too large to add to the current instant never expires.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> V {
        self.store.insert(
            key.into(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        value
    }

    /// Removes the entry for `key` if present.
    pub fn delete(&self, key: &str) {
        self.store.remove(key);
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.store.len())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl<V: Clone> Default for TtlMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
