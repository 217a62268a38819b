//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking and lazy TTL
//! expiration.

use std::collections::HashMap;

use axum::body::Bytes;
use chrono::{TimeDelta, Utc};

use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Cache Store ==
/// Bounded key/bytes store with LRU eviction and per-entry TTL.
///
/// Every method takes `&mut self` or `&self`, so a shared store is wrapped in
/// a single lock (see [`crate::cache::SharedCache`]). `get` needs the write
/// side because it promotes entries and updates counters; a lookup therefore
/// runs as one critical section from existence check to stat update.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Cumulative counters, never reset by `clear`
    stats: CacheStats,
    /// Sum of the value sizes of all entries
    total_bytes: usize,
    /// Maximum number of entries allowed
    capacity: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new store holding at most `capacity` entries.
    ///
    /// A capacity of zero turns the store into a sink: every insert is evicted
    /// immediately.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(capacity),
            total_bytes: 0,
            capacity,
        }
    }

    // == Get ==
    /// Looks up a live entry.
    ///
    /// A missing key counts as a miss. An expired entry is evicted on the spot
    /// and also counts as a miss. A live entry is promoted to most recently
    /// used and counts as a hit.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.evict(key);
            self.stats.record_miss();
            return None;
        }

        self.lru.touch(key);
        self.stats.record_hit();
        self.entries.get(key).cloned()
    }

    // == Set ==
    /// Inserts or replaces an entry.
    ///
    /// `ttl` of `None` stores the entry without expiry. Returns `true` when the
    /// key was new and `false` when an existing entry was replaced. New
    /// entries may push the least recently used ones out.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<TimeDelta>) -> bool {
        let key = key.into();
        let entry = CacheEntry::new(key.clone(), value.into(), ttl);
        let size = entry.size;

        if let Some(existing) = self.entries.get_mut(&key) {
            self.total_bytes = self.total_bytes - existing.size + size;
            *existing = entry;
            self.lru.touch(&key);
            return false;
        }

        self.lru.touch(&key);
        self.entries.insert(key, entry);
        self.total_bytes += size;

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.lru.peek_oldest().map(str::to_owned) else {
                break;
            };
            self.evict(&oldest);
        }

        true
    }

    // == Remove ==
    /// Removes an entry. Counts as an eviction when the key was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.evict(key)
    }

    // == Clear ==
    /// Drops every entry. Cumulative hit/miss/eviction counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.total_bytes = 0;
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Stats ==
    /// Returns a snapshot of the counters and current occupancy.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_occupancy(self.entries.len(), self.total_bytes);
        stats
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lru.iter_recent().map(str::to_owned).collect()
    }

    fn evict(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.lru.remove(key);
                self.total_bytes -= entry.size;
                self.stats.record_eviction();
                true
            }
            None => false,
        }
    }
}
