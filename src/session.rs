//! Per-session binding of the cache to the current role and a transport.

use crate::cache::{
    CacheConfig, CacheRead, CacheStats, Clock, FetchCoordinator, InvalidationEvent, Method,
    ReadOptions, Role, RoleScope,
};
use crate::error::ApiError;
use crate::resource::ResourceType;
use crate::transport::Transport;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;
use uuid::Uuid;

/// Cache context for one signed-in session.
///
/// Created at sign-in and torn down at logout. Every read and write is scoped
/// to the role the session currently holds.
pub struct CacheSession {
    id: Uuid,
    coordinator: FetchCoordinator<ResourceType, Value>,
    transport: Arc<dyn Transport>,
    role: RwLock<Role>,
}

impl CacheSession {
    pub fn new(
        config: CacheConfig<ResourceType>,
        transport: Arc<dyn Transport>,
        role: impl Into<Role>,
    ) -> Self {
        Self::from_coordinator(FetchCoordinator::new(config), transport, role.into())
    }

    /// Session whose cache reads time from `clock`
    pub fn with_clock(
        config: CacheConfig<ResourceType>,
        transport: Arc<dyn Transport>,
        role: impl Into<Role>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_coordinator(
            FetchCoordinator::with_clock(config, clock),
            transport,
            role.into(),
        )
    }

    fn from_coordinator(
        coordinator: FetchCoordinator<ResourceType, Value>,
        transport: Arc<dyn Transport>,
        role: Role,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(session_id = %id, %role, "Cache session started");
        Self {
            id,
            coordinator,
            transport,
            role: RwLock::new(role),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    /// Role new reads and writes are scoped to
    pub fn role(&self) -> Role {
        self.role
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch role. Entries cached under the previous role are kept and
    /// become visible again if the session switches back.
    pub fn set_role(&self, role: impl Into<Role>) {
        let role = role.into();
        let mut current = self.role.write().unwrap_or_else(PoisonError::into_inner);
        if *current != role {
            info!(session_id = %self.id, from = %*current, to = %role, "Role changed");
            *current = role;
        }
    }

    pub fn coordinator(&self) -> &FetchCoordinator<ResourceType, Value> {
        &self.coordinator
    }

    /// Read `endpoint` through the cache under the current role
    pub async fn cached_get(
        &self,
        resource_type: ResourceType,
        endpoint: &str,
        options: ReadOptions,
    ) -> Result<Value, ApiError> {
        self.cached_get_with_status(resource_type, endpoint, options)
            .await
            .map(CacheRead::into_value)
    }

    /// Same as [`cached_get`](Self::cached_get), reporting whether the
    /// payload is a stale fallback
    pub async fn cached_get_with_status(
        &self,
        resource_type: ResourceType,
        endpoint: &str,
        options: ReadOptions,
    ) -> Result<CacheRead<Value>, ApiError> {
        let role = self.role();
        let transport = Arc::clone(&self.transport);
        self.coordinator
            .read_with_status(
                resource_type,
                &role,
                |params| async move { transport.fetch(endpoint, &params).await },
                options,
            )
            .await
    }

    /// Send a write, then invalidate `invalidated_types` for the current role
    pub async fn cached_mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        invalidated_types: &[ResourceType],
    ) -> Result<Value, ApiError> {
        let role = self.role();
        let transport = Arc::clone(&self.transport);
        self.coordinator
            .mutate(
                method,
                &role,
                || async move { transport.write(method, endpoint, body.as_ref()).await },
                invalidated_types,
            )
            .await
    }

    /// Warm one view for the current role
    pub async fn prefetch(&self, resource_type: ResourceType, endpoint: &str, identifier: &str) {
        let role = self.role();
        let transport = Arc::clone(&self.transport);
        self.coordinator
            .prefetch(
                resource_type,
                &role,
                |params| async move { transport.fetch(endpoint, &params).await },
                identifier,
            )
            .await
    }

    pub fn invalidate(&self, resource_type: ResourceType, identifier: &str) -> InvalidationEvent {
        self.coordinator
            .invalidate(&resource_type, identifier, &self.role())
    }

    /// Drop every view of `resource_type` cached for the current role
    pub fn invalidate_type(&self, resource_type: ResourceType) -> InvalidationEvent {
        let role = self.role();
        self.coordinator
            .invalidate_type(&resource_type, RoleScope::Only(&role))
    }

    /// Administrative reset of one type across every role
    pub fn invalidate_type_all_roles(&self, resource_type: ResourceType) -> InvalidationEvent {
        self.coordinator.invalidate_type(&resource_type, RoleScope::All)
    }

    pub fn clear_role(&self, role: &Role) -> InvalidationEvent {
        self.coordinator.clear_role(role)
    }

    pub fn clear_all(&self) -> InvalidationEvent {
        self.coordinator.clear_all()
    }

    pub fn stats(&self) -> CacheStats<ResourceType> {
        self.coordinator.stats()
    }

    /// Logout: drop everything this session cached
    pub fn teardown(&self) {
        let event = self.coordinator.clear_all();
        info!(session_id = %self.id, removed = event.removed(), "Cache session torn down");
    }
}

impl std::fmt::Debug for CacheSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSession")
            .field("id", &self.id)
            .field("role", &self.role())
            .field("entries", &self.coordinator.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchParams;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the endpoint and params back as the payload
    #[derive(Default)]
    struct EchoTransport {
        fetches: AtomicUsize,
        fail_writes: bool,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Value, ApiError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "endpoint": endpoint, "params": params, "n": n }))
        }

        async fn write(
            &self,
            method: Method,
            endpoint: &str,
            _body: Option<&Value>,
        ) -> Result<Value, ApiError> {
            if self.fail_writes {
                return Err(ApiError::ServerError(format!("{} {}", method, endpoint)));
            }
            Ok(json!({ "ok": true }))
        }
    }

    fn session(transport: Arc<EchoTransport>) -> CacheSession {
        CacheSession::new(CacheConfig::dashboard(), transport, "staff")
    }

    #[tokio::test]
    async fn test_cached_get_reads_through() {
        let transport = Arc::new(EchoTransport::default());
        let session = session(transport.clone());

        let first = session
            .cached_get(ResourceType::Events, "/events", ReadOptions::new())
            .await
            .unwrap();
        let second = session
            .cached_get(ResourceType::Events, "/events", ReadOptions::new())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first["endpoint"], "/events");
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_role_changes_partition() {
        let transport = Arc::new(EchoTransport::default());
        let session = session(transport.clone());

        session
            .cached_get(ResourceType::Donations, "/donations", ReadOptions::new())
            .await
            .unwrap();
        session.set_role("admin");
        session
            .cached_get(ResourceType::Donations, "/donations", ReadOptions::new())
            .await
            .unwrap();
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 2);

        session.set_role("staff");
        session
            .cached_get(ResourceType::Donations, "/donations", ReadOptions::new())
            .await
            .unwrap();
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_cache() {
        let transport = Arc::new(EchoTransport {
            fail_writes: true,
            ..Default::default()
        });
        let session = session(transport);
        session
            .cached_get(ResourceType::Events, "/events", ReadOptions::new())
            .await
            .unwrap();

        let err = session
            .cached_mutate(Method::Post, "/events", Some(json!({})), &[ResourceType::Events])
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::ServerError("POST /events".to_string()));
        assert_eq!(session.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_teardown_clears_everything() {
        let session = session(Arc::new(EchoTransport::default()));
        session.prefetch(ResourceType::Users, "/users", "").await;
        session.set_role("admin");
        session.prefetch(ResourceType::Users, "/users", "").await;
        assert_eq!(session.stats().entries, 2);

        session.teardown();
        assert_eq!(session.stats().entries, 0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = session(Arc::new(EchoTransport::default()));
        let b = session(Arc::new(EchoTransport::default()));
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.role(), Role::new("staff"));
    }
}
