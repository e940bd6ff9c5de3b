//! Read results carrying where the payload came from.
//!
//! The plain read path hides staleness on purpose. Callers that need to
//! tell "fresh" from "served stale after a failed fetch" use
//! [`FetchCoordinator::read_with_status`](crate::cache::FetchCoordinator::read_with_status)
//! and inspect the [`CacheRead`] it returns.

use serde::{Deserialize, Serialize};

/// Where a read was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    /// A fresh entry in the store
    Cache,

    /// The fetcher, result now stored
    Network,

    /// An expired entry, because the fetcher failed
    StaleFallback,
}

/// Result of a cache read, carrying provenance metadata
#[derive(Debug, Clone)]
pub struct CacheRead<V> {
    value: V,
    source: ReadSource,
    /// Rendered fetch error when the read fell back to stale data
    fetch_error: Option<String>,
}

impl<V> CacheRead<V> {
    pub fn from_cache(value: V) -> Self {
        Self {
            value,
            source: ReadSource::Cache,
            fetch_error: None,
        }
    }

    pub fn from_network(value: V) -> Self {
        Self {
            value,
            source: ReadSource::Network,
            fetch_error: None,
        }
    }

    pub fn from_stale(value: V, fetch_error: impl Into<String>) -> Self {
        Self {
            value,
            source: ReadSource::StaleFallback,
            fetch_error: Some(fetch_error.into()),
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// True when an expired entry was served because the fetch failed
    pub fn was_stale(&self) -> bool {
        self.source == ReadSource::StaleFallback
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    /// The fetch failure hidden by a stale fallback
    pub fn fetch_error(&self) -> Option<&str> {
        self.fetch_error.as_deref()
    }

    /// Transform the payload, keeping provenance
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            source: self.source,
            fetch_error: self.fetch_error,
        }
    }
}
