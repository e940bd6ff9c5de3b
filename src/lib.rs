//! # Dashboard Cache (dashboard-cache)
//!
//! Client-side cache for the donation and event dashboard API.
//!
//! ## Features
//!
//! - Role-partitioned entries: a view cached for one role is never served
//!   to another
//! - Per-resource-type TTLs with lazy expiry
//! - Stale-entry fallback when the network fails
//! - Invalidation of whole resource types after successful writes
//! - Coalescing of identical concurrent misses
//! - Reactive bindings that re-read only when their dependencies change
//!
//! ## Session usage
//!
//! ```no_run
//! use dashboard_cache::{CacheConfig, CacheSession, HttpTransport, Method, ReadOptions, ResourceType};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = HttpTransport::new("https://dashboard.example.org/api")?
//!         .with_token("token");
//!     let session = CacheSession::new(CacheConfig::from_env()?, Arc::new(transport), "staff");
//!
//!     let events = session
//!         .cached_get(ResourceType::Events, "/events", ReadOptions::new())
//!         .await?;
//!     println!("{} events", events.as_array().map_or(0, Vec::len));
//!
//!     session
//!         .cached_mutate(
//!             Method::Post,
//!             "/events",
//!             Some(serde_json::json!({ "name": "Gala" })),
//!             &[ResourceType::Events, ResourceType::DashboardStats],
//!         )
//!         .await?;
//!
//!     session.teardown();
//!     Ok(())
//! }
//! ```
//!
//! ## Bindings
//!
//! ```no_run
//! use dashboard_cache::{BoundRequest, CacheSession, ReadOptions, ResourceBinding, ResourceType};
//! use std::sync::Arc;
//!
//! # async fn example(session: Arc<CacheSession>) {
//! let mut binding = ResourceBinding::new(session, ResourceType::Donations, |page: &u32| {
//!     BoundRequest::new("/donations")
//!         .with_options(ReadOptions::new().identifier(format!("page-{page}")).param("page", page.to_string()))
//! });
//!
//! let mut updates = binding.subscribe();
//! binding.watch(1);
//! updates.changed().await.ok();
//! println!("{:?}", binding.state());
//! # }
//! ```

pub mod binding;
pub mod cache;
pub mod error;
pub mod http;
pub mod resource;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use binding::{BindingState, BoundRequest, ResourceBinding};
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheKey, CacheRead, CacheStats, CacheStore, Clock,
    FetchCoordinator, FetchParams, InvalidationEvent, InvalidationReason, ManualClock, Method,
    ReadOptions, ReadSource, Role, RoleScope, SystemClock,
};
pub use error::{ApiError, CacheError, Result};
pub use http::HttpTransport;
pub use resource::ResourceType;
pub use session::CacheSession;
pub use transport::Transport;
