//! Records of what an invalidation removed and why
//!
//! Entries never disappear on their own: expiry only hides them from
//! plain reads. Every removal goes through one of the reasons below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// One key removed by the caller
    Manual,

    /// Every entry of a resource type, for one role or all roles
    ResourceType { resource_type: String, role: Option<String> },

    /// A successful write touched the resource type
    Mutation { method: String, resource_type: String },

    /// Every entry belonging to a role
    RoleCleared { role: String },

    /// The whole store (logout, session teardown)
    ClearAll,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::ResourceType {
                resource_type,
                role: Some(role),
            } => write!(f, "resource type {} for role {}", resource_type, role),
            InvalidationReason::ResourceType {
                resource_type,
                role: None,
            } => write!(f, "resource type {} for all roles", resource_type),
            InvalidationReason::Mutation {
                method,
                resource_type,
            } => write!(f, "{} invalidated {}", method, resource_type),
            InvalidationReason::RoleCleared { role } => write!(f, "role cleared: {}", role),
            InvalidationReason::ClearAll => write!(f, "cache cleared"),
        }
    }
}

/// Event for cache invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Rendered keys that were removed
    pub keys: Vec<String>,
}

impl InvalidationEvent {
    /// Create a new invalidation event
    pub fn new(reason: InvalidationReason, keys: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            reason,
            timestamp,
            keys,
        }
    }

    /// Number of entries removed
    pub fn removed(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Re-label the event, e.g. when a store-level type invalidation was
    /// triggered by a mutation
    pub fn with_reason(mut self, reason: InvalidationReason) -> Self {
        self.reason = reason;
        self
    }
}
