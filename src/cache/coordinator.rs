//! Read-through / write-invalidate coordination between callers, the store
//! and an injected remote capability.
//!
//! The coordinator never performs I/O itself. Reads take a fetcher closure,
//! writes take a writer closure; both are the only suspension points.

use crate::cache::{
    clock::Clock,
    config::CacheConfig,
    invalidation::{InvalidationEvent, InvalidationReason},
    read::CacheRead,
    store::CacheStore,
    types::{CacheKey, CacheStats, FetchParams, Method, Role, RoleScope},
};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Options for a single read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Secondary key; empty means the collection view
    pub identifier: String,

    /// Skip the cache check and always call the fetcher
    pub force_refresh: bool,

    /// TTL for the entry this read writes, instead of the type default
    pub ttl_override: Option<Duration>,

    /// Forwarded to the fetcher untouched
    pub params: FetchParams,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn ttl_override(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

type InFlightMap<R> = HashMap<CacheKey<R>, Arc<AsyncMutex<()>>>;

/// Mediates between "read resource X" and the store plus a remote fetch.
///
/// One instance per application session. Cheap to share behind an `Arc`.
pub struct FetchCoordinator<R, V>
where
    R: Eq + Hash,
{
    store: Mutex<CacheStore<R, V>>,

    /// Per-key locks for coalescing concurrent misses
    in_flight: Mutex<InFlightMap<R>>,

    coalesce: bool,
}

impl<R, V> FetchCoordinator<R, V>
where
    R: Eq + Hash + Clone + Display + Debug,
    V: Clone,
{
    /// Create a coordinator over a fresh store
    pub fn new(config: CacheConfig<R>) -> Self {
        Self::from_store(CacheStore::new(config))
    }

    /// Create a coordinator reading time from `clock`
    pub fn with_clock(config: CacheConfig<R>, clock: Arc<dyn Clock>) -> Self {
        Self::from_store(CacheStore::with_clock(config, clock))
    }

    /// Create from existing store instance
    pub fn from_store(store: CacheStore<R, V>) -> Self {
        let coalesce = store.config().coalesce_requests;
        Self {
            store: Mutex::new(store),
            in_flight: Mutex::new(HashMap::new()),
            coalesce,
        }
    }

    /// Read a resource through the cache.
    ///
    /// Fresh hits return without calling `fetcher`. Misses (and forced
    /// refreshes) call it and store the result, unless an invalidation
    /// covering the key ran while the fetch was in flight. If the fetch fails and an
    /// expired entry exists, that entry is returned and the failure is only
    /// logged; otherwise the fetcher's error is returned unchanged.
    pub async fn read<F, Fut, E>(
        &self,
        resource_type: R,
        role: &Role,
        fetcher: F,
        options: ReadOptions,
    ) -> Result<V, E>
    where
        F: FnOnce(FetchParams) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        self.read_with_status(resource_type, role, fetcher, options)
            .await
            .map(CacheRead::into_value)
    }

    /// Same as [`read`](Self::read), reporting where the payload came from
    pub async fn read_with_status<F, Fut, E>(
        &self,
        resource_type: R,
        role: &Role,
        fetcher: F,
        options: ReadOptions,
    ) -> Result<CacheRead<V>, E>
    where
        F: FnOnce(FetchParams) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        let ReadOptions {
            identifier,
            force_refresh,
            ttl_override,
            params,
        } = options;

        if !force_refresh {
            let cached = self.lock_store().get(&resource_type, &identifier, role);
            if let Some(payload) = cached {
                return Ok(CacheRead::from_cache(payload));
            }
        }

        // Held until the fetch settles so identical misses queue behind it
        let _slot = if self.coalesce && !force_refresh {
            let slot = self
                .claim_slot(CacheKey::new(resource_type.clone(), identifier.clone(), role.clone()))
                .await;
            let settled = self.lock_store().take_coalesced(&resource_type, &identifier, role);
            if let Some(payload) = settled {
                debug!(%resource_type, identifier = %identifier, %role, "Served by coalesced fetch");
                return Ok(CacheRead::from_cache(payload));
            }
            Some(slot)
        } else {
            None
        };

        let epoch = self.lock_store().epoch();

        match fetcher(params).await {
            Ok(payload) => {
                let mut store = self.lock_store();
                if store.invalidated_since(&resource_type, role, epoch) {
                    // A write landed mid-fetch; this payload may predate it
                    debug!(%resource_type, identifier = %identifier, %role, "Invalidated during fetch, not caching");
                } else {
                    store.set(
                        resource_type,
                        identifier,
                        payload.clone(),
                        role.clone(),
                        ttl_override,
                    );
                }
                Ok(CacheRead::from_network(payload))
            }
            Err(e) => {
                let mut store = self.lock_store();
                match store.peek_stale(&resource_type, &identifier, role) {
                    Some(stale) => {
                        store.record_stale_served();
                        warn!(
                            %resource_type,
                            identifier = %identifier,
                            %role,
                            error = %e,
                            "Fetch failed, serving stale cache entry"
                        );
                        Ok(CacheRead::from_stale(stale, e.to_string()))
                    }
                    None => {
                        debug!(%resource_type, identifier = %identifier, %role, error = %e, "Fetch failed with no cached fallback");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Warm the cache; the payload is discarded and failures only logged
    pub async fn prefetch<F, Fut, E>(
        &self,
        resource_type: R,
        role: &Role,
        fetcher: F,
        identifier: impl Into<String>,
    ) where
        F: FnOnce(FetchParams) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        let options = ReadOptions::new().identifier(identifier);
        let label = resource_type.clone();
        if let Err(e) = self.read(resource_type, role, fetcher, options).await {
            warn!(resource_type = %label, %role, error = %e, "Prefetch failed");
        }
    }

    /// Perform a remote write, then invalidate the affected types.
    ///
    /// Invalidation happens only after the writer succeeds and always before
    /// this returns; a failed write invalidates nothing. The write's response
    /// is never stored.
    pub async fn mutate<W, Fut, T, E>(
        &self,
        method: Method,
        role: &Role,
        writer: W,
        invalidated_types: &[R],
    ) -> Result<T, E>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match writer().await {
            Ok(result) => {
                let events = self.invalidate_after_write(method, role, invalidated_types);
                let removed: usize = events.iter().map(InvalidationEvent::removed).sum();
                debug!(%method, %role, types = invalidated_types.len(), removed, "Mutation applied");
                Ok(result)
            }
            Err(e) => {
                warn!(%method, %role, error = %e, "Mutation failed, cache left untouched");
                Err(e)
            }
        }
    }

    fn invalidate_after_write(
        &self,
        method: Method,
        role: &Role,
        invalidated_types: &[R],
    ) -> Vec<InvalidationEvent> {
        let mut store = self.lock_store();
        invalidated_types
            .iter()
            .map(|resource_type| {
                store
                    .invalidate_type(resource_type, RoleScope::Only(role))
                    .with_reason(InvalidationReason::Mutation {
                        method: method.to_string(),
                        resource_type: resource_type.to_string(),
                    })
            })
            .collect()
    }

    /// Fresh payload, counting a hit or miss
    pub fn get(&self, resource_type: &R, identifier: &str, role: &Role) -> Option<V> {
        self.lock_store().get(resource_type, identifier, role)
    }

    pub fn set(
        &self,
        resource_type: R,
        identifier: impl Into<String>,
        payload: V,
        role: Role,
        ttl_override: Option<Duration>,
    ) {
        self.lock_store()
            .set(resource_type, identifier, payload, role, ttl_override)
    }

    pub fn peek_stale(&self, resource_type: &R, identifier: &str, role: &Role) -> Option<V> {
        self.lock_store().peek_stale(resource_type, identifier, role)
    }

    pub fn invalidate(&self, resource_type: &R, identifier: &str, role: &Role) -> InvalidationEvent {
        self.lock_store().invalidate(resource_type, identifier, role)
    }

    pub fn invalidate_type(&self, resource_type: &R, scope: RoleScope<'_>) -> InvalidationEvent {
        self.lock_store().invalidate_type(resource_type, scope)
    }

    pub fn clear_role(&self, role: &Role) -> InvalidationEvent {
        self.lock_store().clear_role(role)
    }

    pub fn clear_all(&self) -> InvalidationEvent {
        self.lock_store().clear_all()
    }

    pub fn stats(&self) -> CacheStats<R> {
        self.lock_store().stats()
    }

    pub fn len(&self) -> usize {
        self.lock_store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_store().is_empty()
    }

    /// Run `f` with exclusive access to the store
    pub fn with_store<T>(&self, f: impl FnOnce(&mut CacheStore<R, V>) -> T) -> T {
        f(&mut self.lock_store())
    }

    /// Number of keys with a fetch currently holding their coalescing slot
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every store operation mutates it in a single step.
    fn lock_store(&self) -> MutexGuard<'_, CacheStore<R, V>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlightMap<R>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn claim_slot(&self, key: CacheKey<R>) -> InFlightSlot<'_, R, V> {
        let lock = {
            let mut map = self.lock_in_flight();
            Arc::clone(map.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        InFlightSlot {
            coordinator: self,
            key,
            lock,
            guard: Some(guard),
        }
    }
}

impl<R, V> Debug for FetchCoordinator<R, V>
where
    R: Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("store", &self.store)
            .field("coalesce", &self.coalesce)
            .finish()
    }
}

/// Ownership of one key's coalescing lock. Releases the lock and prunes
/// the map entry on drop, including when the read is cancelled.
struct InFlightSlot<'a, R, V>
where
    R: Eq + Hash,
{
    coordinator: &'a FetchCoordinator<R, V>,
    key: CacheKey<R>,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<R, V> Drop for InFlightSlot<'_, R, V>
where
    R: Eq + Hash,
{
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self
            .coordinator
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else is waiting on this key
        if Arc::strong_count(&self.lock) <= 2 {
            map.remove(&self.key);
        }
    }
}
