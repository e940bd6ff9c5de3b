//! Cache entry management with TTL support

use crate::cache::types::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cache entry with TTL and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<R, V> {
    /// The cache key
    pub key: CacheKey<R>,

    /// The cached payload, opaque to the cache
    pub payload: V,

    /// Entry metadata
    pub metadata: CacheMetadata,
}

impl<R, V> CacheEntry<R, V> {
    /// Create a new entry stored at `now` with an effective TTL
    pub fn new(key: CacheKey<R>, payload: V, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            key,
            payload,
            metadata: CacheMetadata {
                stored_at: now,
                ttl,
                hits: 0,
            },
        }
    }

    /// Check if the entry has expired.
    ///
    /// A zero TTL is always expired, even at the instant it was written.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.metadata.ttl.is_zero() {
            return true;
        }
        match chrono::Duration::from_std(self.metadata.ttl) {
            Ok(ttl) => now - self.metadata.stored_at > ttl,
            // Too large to represent: never expires
            Err(_) => false,
        }
    }

    /// Get time until expiration.
    ///
    /// `None` once expired, and also when the expiry instant lies beyond
    /// the representable date range.
    pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_expired_at(now) {
            return None;
        }
        let ttl = chrono::Duration::from_std(self.metadata.ttl).ok()?;
        let expires_at = self.metadata.stored_at.checked_add_signed(ttl)?;
        (expires_at - now).to_std().ok()
    }

    /// Get the age of the entry
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.metadata.stored_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Replace the payload and restart the TTL window
    pub fn replace(&mut self, payload: V, ttl: Duration, now: DateTime<Utc>) {
        self.payload = payload;
        self.metadata.stored_at = now;
        self.metadata.ttl = ttl;
        self.metadata.hits = 0;
    }

    /// Mark the entry as served from cache
    pub fn mark_hit(&mut self) {
        self.metadata.hits += 1;
    }

    /// Point-in-time view of the entry's metadata
    pub fn snapshot(&self, now: DateTime<Utc>) -> EntrySnapshot {
        EntrySnapshot {
            metadata: self.metadata.clone(),
            age: self.age(now),
            time_until_expiration: self.time_until_expiration(now),
            expired: self.is_expired_at(now),
        }
    }
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the payload was written
    pub stored_at: DateTime<Utc>,

    /// Effective time-to-live (per-call override or type default)
    pub ttl: Duration,

    /// Fresh reads served since the last write
    pub hits: u64,
}

/// Metadata plus the values derived from it at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    pub metadata: CacheMetadata,

    /// Time since the payload was written
    pub age: Duration,

    /// Remaining freshness; `None` when expired or not representable
    pub time_until_expiration: Option<Duration>,

    pub expired: bool,
}
