//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use axum::body::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

// == Cache Entry ==
/// A single cached value plus the bookkeeping needed for expiry and size stats.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: String,
    /// The stored bytes
    pub value: Bytes,
    /// Length of `value` in bytes
    pub size: usize,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// `ttl` of `None` or zero means the entry never expires. A negative TTL
    /// yields an entry that is already due and disappears on its next lookup.
    pub fn new(key: String, value: Bytes, ttl: Option<TimeDelta>) -> Self {
        let now = Utc::now();
        let expires_at = ttl
            .filter(|ttl| *ttl != TimeDelta::zero())
            .and_then(|ttl| now.checked_add_signed(ttl));

        Self {
            key,
            size: value.len(),
            value,
            created_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` is strictly after its expiration time.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now > expires,
            None => false,
        }
    }
}
