//! Resource types of the dashboard application and their TTL policy.
//!
//! The store is generic over any comparable tag; the application pins it to
//! this closed set so a typo can't silently create a new cache partition.

use crate::cache::config::{parse_ttl_millis, CacheConfig};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// A class of cached API data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Events,
    Donations,
    InKindDonations,
    Reports,
    Volunteers,
    Users,
    DashboardStats,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Events,
        ResourceType::Donations,
        ResourceType::InKindDonations,
        ResourceType::Reports,
        ResourceType::Volunteers,
        ResourceType::Users,
        ResourceType::DashboardStats,
    ];

    /// Tag used in cache keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Events => "events",
            ResourceType::Donations => "donations",
            ResourceType::InKindDonations => "inKindDonations",
            ResourceType::Reports => "reports",
            ResourceType::Volunteers => "volunteers",
            ResourceType::Users => "users",
            ResourceType::DashboardStats => "dashboardStats",
        }
    }

    /// Default TTL: totals move constantly, user lists barely at all
    pub fn default_ttl(&self) -> Duration {
        match self {
            ResourceType::DashboardStats => Duration::from_secs(60),
            ResourceType::Donations | ResourceType::InKindDonations => Duration::from_secs(2 * 60),
            ResourceType::Events | ResourceType::Volunteers => Duration::from_secs(5 * 60),
            ResourceType::Reports => Duration::from_secs(10 * 60),
            ResourceType::Users => Duration::from_secs(30 * 60),
        }
    }

    /// Environment variable overriding this type's TTL in milliseconds
    pub fn env_var(&self) -> String {
        let mut name = String::from("CACHE_TTL_");
        for (i, c) in self.as_str().chars().enumerate() {
            if c.is_ascii_uppercase() && i > 0 {
                name.push('_');
            }
            name.push(c.to_ascii_uppercase());
        }
        name.push_str("_MS");
        name
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CacheError::Other(format!("unknown resource type: {}", s)))
    }
}

/// Environment variable for the TTL of unmapped types
pub const FALLBACK_TTL_ENV: &str = "CACHE_FALLBACK_TTL_MS";

/// Environment variable toggling in-flight request coalescing
pub const COALESCE_ENV: &str = "CACHE_COALESCE_REQUESTS";

impl CacheConfig<ResourceType> {
    /// Configuration with every resource type at its default TTL
    pub fn dashboard() -> Self {
        CacheConfig::builder()
            .ttls(ResourceType::ALL.into_iter().map(|t| (t, t.default_ttl())))
            .build()
    }

    /// Dashboard defaults overridden from the environment (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Dashboard defaults overridden by whatever `lookup` returns
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::dashboard();

        for resource_type in ResourceType::ALL {
            let name = resource_type.env_var();
            if let Some(raw) = lookup(&name) {
                let ttl = parse_ttl_millis(&name, &raw)?;
                debug!(%resource_type, ?ttl, "TTL overridden from environment");
                config.default_ttls.insert(resource_type, ttl);
            }
        }

        if let Some(raw) = lookup(FALLBACK_TTL_ENV) {
            config.fallback_ttl = parse_ttl_millis(FALLBACK_TTL_ENV, &raw)?;
        }

        if let Some(raw) = lookup(COALESCE_ENV) {
            config.coalesce_requests = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(CacheError::InvalidConfig(format!(
                        "{} must be a boolean, got {:?}",
                        COALESCE_ENV, other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resource_type_display_and_parse() {
        assert_eq!(ResourceType::InKindDonations.to_string(), "inKindDonations");
        assert_eq!(
            "dashboardStats".parse::<ResourceType>().unwrap(),
            ResourceType::DashboardStats
        );
        assert!("widgets".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_serde_names_match_tags() {
        for t in ResourceType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(ResourceType::Events.env_var(), "CACHE_TTL_EVENTS_MS");
        assert_eq!(
            ResourceType::InKindDonations.env_var(),
            "CACHE_TTL_IN_KIND_DONATIONS_MS"
        );
    }

    #[test]
    fn test_dashboard_preset() {
        let config = CacheConfig::dashboard();
        assert_eq!(config.ttl_for(&ResourceType::DashboardStats), Duration::from_secs(60));
        assert_eq!(config.ttl_for(&ResourceType::Users), Duration::from_secs(1800));
        assert_eq!(config.default_ttls.len(), ResourceType::ALL.len());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CACHE_TTL_EVENTS_MS", "60000"),
            ("CACHE_TTL_REPORTS_MS", "0"),
            ("CACHE_COALESCE_REQUESTS", "off"),
        ]
        .into_iter()
        .collect();

        let config =
            CacheConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.ttl_for(&ResourceType::Events), Duration::from_millis(60_000));
        assert_eq!(config.ttl_for(&ResourceType::Reports), Duration::ZERO);
        assert_eq!(config.ttl_for(&ResourceType::Donations), Duration::from_secs(120));
        assert!(!config.coalesce_requests);
    }

    #[test]
    fn test_from_lookup_rejects_negative_ttl() {
        let result = CacheConfig::from_lookup(|name| {
            (name == "CACHE_TTL_DONATIONS_MS").then(|| "-1".to_string())
        });
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_lookup_rejects_bad_boolean() {
        let result =
            CacheConfig::from_lookup(|name| (name == COALESCE_ENV).then(|| "maybe".to_string()));
        assert!(result.is_err());
    }
}
