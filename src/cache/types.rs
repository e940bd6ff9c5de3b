//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Opaque partition key supplied by the session layer.
///
/// The cache never inspects a role; it only compares them, so switching
/// identity can never serve another role's cached view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which roles a bulk invalidation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope<'a> {
    /// Entries stored under this role only
    Only(&'a Role),

    /// Entries under every role (administrative reset)
    All,
}

impl RoleScope<'_> {
    pub fn matches(&self, role: &Role) -> bool {
        match self {
            RoleScope::Only(r) => *r == role,
            RoleScope::All => true,
        }
    }
}

impl fmt::Display for RoleScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleScope::Only(role) => write!(f, "{}", role),
            RoleScope::All => write!(f, "*"),
        }
    }
}

/// Composite cache key: `(resource_type, identifier, role)`.
///
/// An empty identifier addresses the collection view of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey<R> {
    pub resource_type: R,
    pub identifier: String,
    pub role: Role,
}

impl<R> CacheKey<R> {
    pub fn new(resource_type: R, identifier: impl Into<String>, role: Role) -> Self {
        Self {
            resource_type,
            identifier: identifier.into(),
            role,
        }
    }
}

impl<R: fmt::Display> fmt::Display for CacheKey<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.resource_type, self.identifier, self.role)
    }
}

/// Opaque parameters forwarded to a fetcher; the cache never reads them
pub type FetchParams = std::collections::BTreeMap<String, String>;

/// HTTP method of a mutating call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics for cache observability.
///
/// Never consulted for control flow.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats<R: Eq + Hash> {
    /// Total number of fresh reads served from the store
    pub hits: u64,

    /// Total number of reads that found nothing fresh
    pub misses: u64,

    /// Number of entries currently in cache (fresh or stale)
    pub entries: usize,

    /// Entries per resource type
    pub entries_by_type: HashMap<R, usize>,

    /// Entries removed by invalidation or clearing
    pub invalidations: u64,

    /// Reads answered from an expired entry after a failed fetch
    pub stale_served: u64,
}

impl<R: Eq + Hash> Default for CacheStats<R> {
    fn default() -> Self {
        Self {
            hits: 0,
            misses: 0,
            entries: 0,
            entries_by_type: HashMap::new(),
            invalidations: 0,
            stale_served: 0,
        }
    }
}

impl<R: Eq + Hash> CacheStats<R> {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Entries currently held for one resource type
    pub fn entries_for(&self, resource_type: &R) -> usize {
        self.entries_by_type.get(resource_type).copied().unwrap_or(0)
    }
}

impl<R: Eq + Hash> fmt::Display for CacheStats<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, types: {}, invalidations: {}, stale_served: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.entries_by_type.len(),
            self.invalidations,
            self.stale_served
        )
    }
}
