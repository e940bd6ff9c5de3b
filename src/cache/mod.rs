//! # Role-partitioned TTL cache
//!
//! Read-through / write-invalidate caching for API payloads. Every entry is
//! keyed by `(resource_type, identifier, role)` so a cached view is only
//! ever served back to the role that fetched it.
//!
//! ## Features
//!
//! - **Lazy TTL expiry**: freshness is evaluated on read; expired entries are
//!   kept as a fallback for failed fetches
//! - **Type-level invalidation**: writes invalidate whole resource types for
//!   the writing role
//! - **Request coalescing**: identical concurrent misses share one fetch
//! - **Injected clock**: deterministic expiry in tests
//!
//! ## Example
//!
//! ```rust
//! use dashboard_cache::cache::{CacheConfig, FetchCoordinator, ReadOptions, Role};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let config = CacheConfig::builder()
//!     .ttl("events", Duration::from_secs(60))
//!     .build();
//! let coordinator: FetchCoordinator<&str, Vec<String>> = FetchCoordinator::new(config);
//! let staff = Role::new("staff");
//!
//! let events = coordinator
//!     .read(
//!         "events",
//!         &staff,
//!         |_params| async { Ok::<_, String>(vec!["e1".to_string()]) },
//!         ReadOptions::new(),
//!     )
//!     .await?;
//! assert_eq!(events, vec!["e1".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod invalidation;
pub mod read;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_FALLBACK_TTL};
pub use coordinator::{FetchCoordinator, ReadOptions};
pub use entry::{CacheEntry, CacheMetadata};
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use read::{CacheRead, ReadSource};
pub use store::CacheStore;
pub use types::{CacheKey, CacheStats, FetchParams, Method, Role, RoleScope};
