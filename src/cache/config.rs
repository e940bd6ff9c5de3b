//! Configuration for the cache system

use crate::error::{CacheError, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// TTL used for resource types without an explicit default
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(300);

/// Configuration for the cache.
///
/// Maps each resource type to the TTL its entries get unless a write
/// carries its own override. Volatile resources (donation totals) get
/// minutes, near-static ones get much longer.
#[derive(Debug, Clone)]
pub struct CacheConfig<R: Eq + Hash> {
    /// Per-type default time-to-live
    pub default_ttls: HashMap<R, Duration>,

    /// TTL for types missing from `default_ttls`
    pub fallback_ttl: Duration,

    /// Serialize concurrent misses on the same key so only one fetch runs
    pub coalesce_requests: bool,
}

impl<R: Eq + Hash> Default for CacheConfig<R> {
    fn default() -> Self {
        Self {
            default_ttls: HashMap::new(),
            fallback_ttl: DEFAULT_FALLBACK_TTL,
            coalesce_requests: true,
        }
    }
}

impl<R: Eq + Hash> CacheConfig<R> {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder<R> {
        CacheConfigBuilder::default()
    }

    /// Default TTL for a resource type
    pub fn ttl_for(&self, resource_type: &R) -> Duration {
        self.default_ttls
            .get(resource_type)
            .copied()
            .unwrap_or(self.fallback_ttl)
    }

    /// Effective TTL for a write: the override wins over the type default
    pub fn effective_ttl(&self, resource_type: &R, ttl_override: Option<Duration>) -> Duration {
        ttl_override.unwrap_or_else(|| self.ttl_for(resource_type))
    }

    /// Validate the configuration.
    ///
    /// A zero TTL is accepted and means "always expired"; only the fallback
    /// must be positive so unknown types are still cached.
    pub fn validate(&self) -> Result<()> {
        if self.fallback_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "fallback_ttl must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a millisecond TTL from configuration text.
///
/// Negative values are rejected; `0` is allowed and disables caching for
/// the type it is assigned to.
pub fn parse_ttl_millis(name: &str, raw: &str) -> Result<Duration> {
    let millis: i64 = raw.trim().parse().map_err(|_| {
        CacheError::InvalidConfig(format!("{} must be an integer number of milliseconds, got {:?}", name, raw))
    })?;
    if millis < 0 {
        return Err(CacheError::InvalidConfig(format!(
            "{} must not be negative, got {}",
            name, millis
        )));
    }
    Ok(Duration::from_millis(millis as u64))
}

/// Builder for cache configuration
#[derive(Debug)]
pub struct CacheConfigBuilder<R: Eq + Hash> {
    default_ttls: HashMap<R, Duration>,
    fallback_ttl: Option<Duration>,
    coalesce_requests: Option<bool>,
}

impl<R: Eq + Hash> Default for CacheConfigBuilder<R> {
    fn default() -> Self {
        Self {
            default_ttls: HashMap::new(),
            fallback_ttl: None,
            coalesce_requests: None,
        }
    }
}

impl<R: Eq + Hash> CacheConfigBuilder<R> {
    /// Set the default TTL for one resource type
    pub fn ttl(mut self, resource_type: R, ttl: Duration) -> Self {
        self.default_ttls.insert(resource_type, ttl);
        self
    }

    /// Set default TTLs for several resource types
    pub fn ttls(mut self, ttls: impl IntoIterator<Item = (R, Duration)>) -> Self {
        self.default_ttls.extend(ttls);
        self
    }

    /// Set TTL for resource types without an explicit default
    pub fn fallback_ttl(mut self, ttl: Duration) -> Self {
        self.fallback_ttl = Some(ttl);
        self
    }

    /// Enable or disable in-flight request coalescing
    pub fn coalesce_requests(mut self, enable: bool) -> Self {
        self.coalesce_requests = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig<R> {
        CacheConfig {
            default_ttls: self.default_ttls,
            fallback_ttl: self.fallback_ttl.unwrap_or(DEFAULT_FALLBACK_TTL),
            coalesce_requests: self.coalesce_requests.unwrap_or(true),
        }
    }
}
