//! Cache Session Demo
//!
//! Walks through a dashboard session: cached reads, a role switch, a write
//! that invalidates, an offline stale fallback and a reactive binding.
//!
//! Usage:
//!   cargo run --example session_demo
//!
//! Environment variables:
//!   DASHBOARD_API_URL - talk to a real API instead of the built-in fake
//!   DASHBOARD_TOKEN   - bearer token for DASHBOARD_API_URL
//!   RUST_LOG          - log filter (default: info,dashboard_cache=debug)
//!   CACHE_TTL_<TYPE>_MS, CACHE_FALLBACK_TTL_MS, CACHE_COALESCE_REQUESTS

use async_trait::async_trait;
use dashboard_cache::{
    ApiError, BoundRequest, CacheConfig, CacheSession, FetchParams, HttpTransport, Method,
    ReadOptions, ResourceBinding, ResourceType, Transport,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Canned responses standing in for the dashboard API
#[derive(Default)]
struct FakeApi {
    offline: AtomicBool,
}

#[async_trait]
impl Transport for FakeApi {
    async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Value, ApiError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("fake API is offline".to_string()));
        }
        match endpoint {
            "/events" => Ok(json!([{ "id": 1, "name": "Spring Gala" }])),
            "/donations" => Ok(json!({
                "page": params.get("page").cloned().unwrap_or_else(|| "1".to_string()),
                "items": [{ "amount": 250 }]
            })),
            "/dashboard/stats" => Ok(json!({ "raised": 12_500, "volunteers": 48 })),
            other => Err(ApiError::NotFound(other.to_string())),
        }
    }

    async fn write(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        info!("{} {} {:?}", method, endpoint, body);
        Ok(json!({ "ok": true }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dashboard_cache=debug")),
        )
        .init();

    info!("=== Dashboard Cache Session Demo ===");

    let config = CacheConfig::from_env()?;
    let fake = Arc::new(FakeApi::default());
    let transport: Arc<dyn Transport> = match std::env::var("DASHBOARD_API_URL") {
        Ok(url) => {
            info!("Using live API at {}", url);
            let mut http = HttpTransport::new(url)?;
            if let Ok(token) = std::env::var("DASHBOARD_TOKEN") {
                http = http.with_token(token);
            }
            Arc::new(http) as Arc<dyn Transport>
        }
        Err(_) => fake.clone() as Arc<dyn Transport>,
    };

    let session = Arc::new(CacheSession::new(config, transport, "staff"));
    info!("Session {} started as {}", session.session_id(), session.role());

    info!("\n--- Read-through ---");
    for _ in 0..3 {
        let events = session
            .cached_get(ResourceType::Events, "/events", ReadOptions::new())
            .await?;
        info!("events: {}", events);
    }
    info!("{}", session.stats());

    info!("\n--- Role switch ---");
    session.set_role("admin");
    session
        .cached_get(ResourceType::Events, "/events", ReadOptions::new())
        .await?;
    info!("{}", session.stats());

    info!("\n--- Write invalidates ---");
    session
        .cached_mutate(
            Method::Post,
            "/events",
            Some(json!({ "name": "Autumn Fair" })),
            &[ResourceType::Events, ResourceType::DashboardStats],
        )
        .await?;
    info!("admin events cached: {}", session.stats().entries_for(&ResourceType::Events));

    info!("\n--- Offline fallback ---");
    session.prefetch(ResourceType::DashboardStats, "/dashboard/stats", "").await;
    fake.offline.store(true, Ordering::SeqCst);
    let read = session
        .cached_get_with_status(
            ResourceType::DashboardStats,
            "/dashboard/stats",
            ReadOptions::new().force_refresh(true),
        )
        .await;
    match read {
        Ok(read) => info!("stats: {} (stale: {})", read.value(), read.was_stale()),
        Err(e) => info!("stats unavailable: {}", e),
    }
    fake.offline.store(false, Ordering::SeqCst);

    info!("\n--- Binding ---");
    let mut binding = ResourceBinding::new(session.clone(), ResourceType::Donations, |page: &u32| {
        BoundRequest::new("/donations").with_options(
            ReadOptions::new()
                .identifier(format!("page-{page}"))
                .param("page", page.to_string()),
        )
    });
    let mut updates = binding.subscribe();
    for page in [1, 1, 2] {
        binding.watch(page);
        let state = updates.wait_for(|s| !s.loading).await?.clone();
        info!("page {}: {:?}", page, state.data);
    }

    session.teardown();
    info!("{}", session.stats());
    Ok(())
}
