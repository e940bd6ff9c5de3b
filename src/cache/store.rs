//! Role-partitioned key/value/TTL store
//!
//! Entries live in three nested maps, role first, so a role can be dropped
//! in one step and a lookup never allocates. Expiry is evaluated lazily on
//! read; expired entries stay put until overwritten or invalidated so they
//! remain available as a stale fallback.

use crate::cache::{
    clock::{Clock, SystemClock},
    config::CacheConfig,
    entry::{CacheEntry, CacheMetadata, EntrySnapshot},
    invalidation::{InvalidationEvent, InvalidationReason},
    types::{CacheKey, CacheStats, Role, RoleScope},
};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type TypeBucket<R, V> = HashMap<String, CacheEntry<R, V>>;
type RolePartition<R, V> = HashMap<R, TypeBucket<R, V>>;

/// Session-lifetime cache storage keyed by `(resource_type, identifier, role)`.
///
/// Every operation is a total, synchronous function over the map. A miss is
/// a normal outcome, never an error.
pub struct CacheStore<R, V>
where
    R: Eq + Hash,
{
    /// Cache configuration
    config: CacheConfig<R>,

    /// role -> resource type -> identifier -> entry
    partitions: HashMap<Role, RolePartition<R, V>>,

    /// Counters; entry counts are derived on demand
    stats: CacheStats<R>,

    clock: Arc<dyn Clock>,

    /// Bulk-invalidation stamps, see [`CacheStore::epoch`]
    epochs: InvalidationEpochs<R>,
}

/// Epoch stamps of the last bulk invalidation at each scope.
///
/// Every bulk removal takes the next value of `current`; a key was
/// invalidated after epoch `e` iff any stamp covering it exceeds `e`.
struct InvalidationEpochs<R> {
    current: u64,
    by_role_and_type: HashMap<Role, HashMap<R, u64>>,
    by_type: HashMap<R, u64>,
    by_role: HashMap<Role, u64>,
    all: u64,
}

impl<R: Eq + Hash + Clone> InvalidationEpochs<R> {
    fn new() -> Self {
        Self {
            current: 0,
            by_role_and_type: HashMap::new(),
            by_type: HashMap::new(),
            by_role: HashMap::new(),
            all: 0,
        }
    }

    fn advance(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    fn last_for(&self, resource_type: &R, role: &Role) -> u64 {
        let scoped = self
            .by_role_and_type
            .get(role)
            .and_then(|types| types.get(resource_type))
            .copied()
            .unwrap_or(0);
        let typed = self.by_type.get(resource_type).copied().unwrap_or(0);
        let role_wide = self.by_role.get(role).copied().unwrap_or(0);
        scoped.max(typed).max(role_wide).max(self.all)
    }
}

impl<R, V> CacheStore<R, V>
where
    R: Eq + Hash + Clone + Display + Debug,
    V: Clone,
{
    /// Create a new store with the given configuration
    pub fn new(config: CacheConfig<R>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`
    pub fn with_clock(config: CacheConfig<R>, clock: Arc<dyn Clock>) -> Self {
        debug!(
            fallback_ttl = ?config.fallback_ttl,
            typed_defaults = config.default_ttls.len(),
            "Initializing cache store"
        );
        Self {
            config,
            partitions: HashMap::new(),
            stats: CacheStats::default(),
            clock,
            epochs: InvalidationEpochs::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig<R> {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Get a fresh payload.
    ///
    /// Absent and expired entries both read as `None`; an expired entry is
    /// left in place. Counts a hit or a miss.
    pub fn get(&mut self, resource_type: &R, identifier: &str, role: &Role) -> Option<V> {
        let fresh = self.serve_fresh(resource_type, identifier, role);

        if fresh.is_some() {
            self.stats.hits += 1;
            debug!(%resource_type, identifier, %role, "Cache hit");
        } else {
            self.stats.misses += 1;
            debug!(%resource_type, identifier, %role, "Cache miss");
        }
        fresh
    }

    /// Store a payload, replacing any entry under the same key.
    ///
    /// `ttl_override` applies to this entry only; otherwise the type's
    /// configured default is used.
    pub fn set(
        &mut self,
        resource_type: R,
        identifier: impl Into<String>,
        payload: V,
        role: Role,
        ttl_override: Option<Duration>,
    ) {
        let identifier = identifier.into();
        let ttl = self.config.effective_ttl(&resource_type, ttl_override);
        let now = self.clock.now();

        let bucket = self
            .partitions
            .entry(role.clone())
            .or_default()
            .entry(resource_type.clone())
            .or_default();

        if let Some(existing) = bucket.get_mut(&identifier) {
            debug!(%resource_type, identifier = %identifier, %role, ?ttl, "Updating existing cache entry");
            existing.replace(payload, ttl, now);
        } else {
            debug!(%resource_type, identifier = %identifier, %role, ?ttl, "Inserting new cache entry");
            let key = CacheKey::new(resource_type, identifier.clone(), role);
            bucket.insert(identifier, CacheEntry::new(key, payload, ttl, now));
        }
    }

    /// Get a payload regardless of expiry. Does not touch the counters.
    pub fn peek_stale(&self, resource_type: &R, identifier: &str, role: &Role) -> Option<V> {
        self.lookup(resource_type, identifier, role)
            .map(|entry| entry.payload.clone())
    }

    /// Check if a key exists, fresh or stale
    pub fn contains_key(&self, resource_type: &R, identifier: &str, role: &Role) -> bool {
        self.lookup(resource_type, identifier, role).is_some()
    }

    /// Metadata snapshot for one entry
    pub fn metadata(&self, resource_type: &R, identifier: &str, role: &Role) -> Option<CacheMetadata> {
        self.lookup(resource_type, identifier, role)
            .map(|entry| entry.metadata.clone())
    }

    /// Metadata plus age and remaining freshness for one entry
    pub fn entry(&self, resource_type: &R, identifier: &str, role: &Role) -> Option<EntrySnapshot> {
        let now = self.clock.now();
        self.lookup(resource_type, identifier, role)
            .map(|entry| entry.snapshot(now))
    }

    /// Current invalidation epoch.
    ///
    /// Capture it before a fetch; if [`invalidated_since`](Self::invalidated_since)
    /// reports true afterwards, the fetched payload predates a write and
    /// must not be stored.
    pub fn epoch(&self) -> u64 {
        self.epochs.current
    }

    /// Whether a type-, role- or store-wide invalidation covering this
    /// `(resource_type, role)` happened after `epoch`
    pub fn invalidated_since(&self, resource_type: &R, role: &Role, epoch: u64) -> bool {
        self.epochs.last_for(resource_type, role) > epoch
    }

    /// Whether an entry exists but is past its TTL
    pub fn is_stale(&self, resource_type: &R, identifier: &str, role: &Role) -> bool {
        let now = self.clock.now();
        self.lookup(resource_type, identifier, role)
            .map(|entry| entry.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Remove exactly one key
    pub fn invalidate(&mut self, resource_type: &R, identifier: &str, role: &Role) -> InvalidationEvent {
        let mut keys = Vec::new();

        if let Some(partition) = self.partitions.get_mut(role) {
            if let Some(bucket) = partition.get_mut(resource_type) {
                if let Some(entry) = bucket.remove(identifier) {
                    keys.push(entry.key.to_string());
                }
                if bucket.is_empty() {
                    partition.remove(resource_type);
                }
            }
            if partition.is_empty() {
                self.partitions.remove(role);
            }
        }

        debug!(%resource_type, identifier, %role, removed = keys.len(), "Invalidated cache key");
        self.record(InvalidationReason::Manual, keys)
    }

    /// Remove every entry of a resource type for one role or all roles
    pub fn invalidate_type(&mut self, resource_type: &R, scope: RoleScope<'_>) -> InvalidationEvent {
        let mut keys = Vec::new();

        let stamp = self.epochs.advance();
        match scope {
            RoleScope::Only(role) => {
                self.epochs
                    .by_role_and_type
                    .entry(role.clone())
                    .or_default()
                    .insert(resource_type.clone(), stamp);
            }
            RoleScope::All => {
                self.epochs.by_type.insert(resource_type.clone(), stamp);
            }
        }

        self.partitions.retain(|role, partition| {
            if scope.matches(role) {
                if let Some(bucket) = partition.remove(resource_type) {
                    keys.extend(bucket.into_values().map(|entry| entry.key.to_string()));
                }
            }
            !partition.is_empty()
        });

        let role = match scope {
            RoleScope::Only(role) => Some(role.to_string()),
            RoleScope::All => None,
        };
        debug!(%resource_type, scope = %scope, removed = keys.len(), "Invalidated resource type");
        self.record(
            InvalidationReason::ResourceType {
                resource_type: resource_type.to_string(),
                role,
            },
            keys,
        )
    }

    /// Remove every entry stored under a role, across all types
    pub fn clear_role(&mut self, role: &Role) -> InvalidationEvent {
        let stamp = self.epochs.advance();
        self.epochs.by_role.insert(role.clone(), stamp);

        let keys: Vec<String> = self
            .partitions
            .remove(role)
            .map(|partition| {
                partition
                    .into_values()
                    .flat_map(|bucket| bucket.into_values())
                    .map(|entry| entry.key.to_string())
                    .collect()
            })
            .unwrap_or_default();

        info!(%role, removed = keys.len(), "Cleared role from cache");
        self.record(
            InvalidationReason::RoleCleared {
                role: role.to_string(),
            },
            keys,
        )
    }

    /// Remove every entry in the store
    pub fn clear_all(&mut self) -> InvalidationEvent {
        self.epochs.all = self.epochs.advance();

        let keys: Vec<String> = self
            .partitions
            .drain()
            .flat_map(|(_, partition)| partition.into_values())
            .flat_map(|bucket| bucket.into_values())
            .map(|entry| entry.key.to_string())
            .collect();

        info!(removed = keys.len(), "Cleared all entries from cache");
        self.record(InvalidationReason::ClearAll, keys)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats<R> {
        let mut stats = self.stats.clone();
        stats.entries_by_type.clear();
        for partition in self.partitions.values() {
            for (resource_type, bucket) in partition {
                *stats
                    .entries_by_type
                    .entry(resource_type.clone())
                    .or_insert(0) += bucket.len();
            }
        }
        stats.entries = stats.entries_by_type.values().sum();
        stats
    }

    /// Number of entries, fresh or stale
    pub fn len(&self) -> usize {
        self.partitions
            .values()
            .flat_map(|p| p.values())
            .map(|b| b.len())
            .sum()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Fresh payload for a read that missed, then waited on an identical
    /// in-flight fetch. Re-counts the earlier miss as a hit when served.
    pub(crate) fn take_coalesced(&mut self, resource_type: &R, identifier: &str, role: &Role) -> Option<V> {
        let fresh = self.serve_fresh(resource_type, identifier, role);

        if fresh.is_some() {
            self.stats.misses = self.stats.misses.saturating_sub(1);
            self.stats.hits += 1;
        }
        fresh
    }

    /// Count a read answered from an expired entry
    pub(crate) fn record_stale_served(&mut self) {
        self.stats.stale_served += 1;
    }

    fn serve_fresh(&mut self, resource_type: &R, identifier: &str, role: &Role) -> Option<V> {
        let now = self.clock.now();
        self.partitions
            .get_mut(role)
            .and_then(|p| p.get_mut(resource_type))
            .and_then(|b| b.get_mut(identifier))
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| {
                entry.mark_hit();
                entry.payload.clone()
            })
    }

    fn lookup(&self, resource_type: &R, identifier: &str, role: &Role) -> Option<&CacheEntry<R, V>> {
        self.partitions
            .get(role)
            .and_then(|p| p.get(resource_type))
            .and_then(|b| b.get(identifier))
    }

    fn record(&mut self, reason: InvalidationReason, keys: Vec<String>) -> InvalidationEvent {
        self.stats.invalidations += keys.len() as u64;
        InvalidationEvent::new(reason, keys, self.clock.now())
    }
}

impl<R, V> Debug for CacheStore<R, V>
where
    R: Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("roles", &self.partitions.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use chrono::Utc;

    fn store_with_clock() -> (CacheStore<&'static str, Vec<&'static str>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = CacheConfig::builder()
            .ttl("events", Duration::from_secs(60))
            .ttl("donations", Duration::from_secs(120))
            .build();
        (CacheStore::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_basic_set_and_get() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");

        store.set("events", "", vec!["e1"], staff.clone(), None);

        assert_eq!(store.get(&"events", "", &staff), Some(vec!["e1"]));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_cache_miss() {
        let (mut store, _) = store_with_clock();
        assert_eq!(store.get(&"events", "", &Role::new("staff")), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_expired_entry_is_hidden_not_removed() {
        let (mut store, clock) = store_with_clock();
        let staff = Role::new("staff");

        store.set("events", "", vec!["e1"], staff.clone(), Some(Duration::from_millis(60_000)));
        clock.advance(Duration::from_millis(61_000));

        assert_eq!(store.get(&"events", "", &staff), None);
        assert!(store.contains_key(&"events", "", &staff));
        assert!(store.is_stale(&"events", "", &staff));
        assert_eq!(store.peek_stale(&"events", "", &staff), Some(vec!["e1"]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_type_default_ttl_applies() {
        let (mut store, clock) = store_with_clock();
        let staff = Role::new("staff");

        store.set("donations", "", vec!["d1"], staff.clone(), None);
        clock.advance(Duration::from_secs(90));
        assert!(store.get(&"donations", "", &staff).is_some());

        clock.advance(Duration::from_secs(31));
        assert!(store.get(&"donations", "", &staff).is_none());
    }

    #[test]
    fn test_zero_ttl_disables_caching_but_keeps_entry() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");

        store.set("events", "", vec!["e1"], staff.clone(), Some(Duration::ZERO));
        assert!(store.get(&"events", "", &staff).is_none());
        assert_eq!(store.peek_stale(&"events", "", &staff), Some(vec!["e1"]));
    }

    #[test]
    fn test_set_overwrites_and_resets_timestamp() {
        let (mut store, clock) = store_with_clock();
        let staff = Role::new("staff");

        store.set("events", "", vec!["old"], staff.clone(), None);
        clock.advance(Duration::from_secs(59));
        store.set("events", "", vec!["new"], staff.clone(), None);
        clock.advance(Duration::from_secs(59));

        assert_eq!(store.get(&"events", "", &staff), Some(vec!["new"]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_role_partition() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        let admin = Role::new("admin");

        store.set("events", "", vec!["staff-view"], staff.clone(), None);

        assert_eq!(store.get(&"events", "", &admin), None);
        assert_eq!(store.peek_stale(&"events", "", &admin), None);
    }

    #[test]
    fn test_invalidate_single_key() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");

        store.set("events", "", vec!["all"], staff.clone(), None);
        store.set("events", "upcoming", vec!["soon"], staff.clone(), None);

        let event = store.invalidate(&"events", "", &staff);
        assert_eq!(event.removed(), 1);
        assert_eq!(event.reason, InvalidationReason::Manual);

        assert!(!store.contains_key(&"events", "", &staff));
        assert!(store.contains_key(&"events", "upcoming", &staff));
    }

    #[test]
    fn test_invalidate_type_scoping() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        let admin = Role::new("admin");

        store.set("events", "", vec!["a"], staff.clone(), None);
        store.set("events", "upcoming", vec!["b"], staff.clone(), None);
        store.set("donations", "", vec!["c"], staff.clone(), None);
        store.set("events", "", vec!["d"], admin.clone(), None);

        let event = store.invalidate_type(&"events", RoleScope::Only(&staff));
        assert_eq!(event.removed(), 2);

        assert!(!store.contains_key(&"events", "", &staff));
        assert!(!store.contains_key(&"events", "upcoming", &staff));
        assert!(store.contains_key(&"donations", "", &staff));
        assert!(store.contains_key(&"events", "", &admin));
    }

    #[test]
    fn test_invalidate_type_all_roles() {
        let (mut store, _) = store_with_clock();

        store.set("events", "", vec!["a"], Role::new("staff"), None);
        store.set("events", "", vec!["b"], Role::new("admin"), None);
        store.set("reports", "", vec!["c"], Role::new("admin"), None);

        let event = store.invalidate_type(&"events", RoleScope::All);
        assert_eq!(event.removed(), 2);
        assert!(matches!(
            event.reason,
            InvalidationReason::ResourceType { role: None, .. }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_role_and_clear_all() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        let admin = Role::new("admin");

        store.set("events", "", vec!["a"], staff.clone(), None);
        store.set("reports", "", vec!["b"], staff.clone(), None);
        store.set("events", "", vec!["c"], admin.clone(), None);

        assert_eq!(store.clear_role(&staff).removed(), 2);
        assert_eq!(store.len(), 1);

        assert_eq!(store.clear_all().removed(), 1);
        assert!(store.is_empty());
        assert_eq!(store.stats().invalidations, 3);
    }

    #[test]
    fn test_stats_by_type() {
        let (mut store, _) = store_with_clock();

        store.set("events", "", vec!["a"], Role::new("staff"), None);
        store.set("events", "", vec!["b"], Role::new("admin"), None);
        store.set("donations", "", vec!["c"], Role::new("staff"), None);

        let stats = store.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.entries_for(&"events"), 2);
        assert_eq!(stats.entries_for(&"donations"), 1);
        assert_eq!(stats.entries_for(&"reports"), 0);
    }

    #[test]
    fn test_peek_does_not_count() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        store.set("events", "", vec!["a"], staff.clone(), None);

        store.peek_stale(&"events", "", &staff);
        store.contains_key(&"events", "", &staff);
        store.entry(&"events", "", &staff);

        let stats = store.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_metadata_tracks_hits() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        store.set("events", "", vec!["a"], staff.clone(), Some(Duration::from_secs(5)));

        store.get(&"events", "", &staff);
        store.get(&"events", "", &staff);

        let metadata = store.metadata(&"events", "", &staff).unwrap();
        assert_eq!(metadata.hits, 2);
        assert_eq!(metadata.ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_entry_snapshot() {
        let (mut store, clock) = store_with_clock();
        let staff = Role::new("staff");
        store.set("events", "", vec!["a"], staff.clone(), None);
        clock.advance(Duration::from_secs(20));

        let snapshot = store.entry(&"events", "", &staff).unwrap();
        assert_eq!(snapshot.age, Duration::from_secs(20));
        assert_eq!(snapshot.time_until_expiration, Some(Duration::from_secs(40)));
        assert!(!snapshot.expired);
        assert!(store.entry(&"events", "", &Role::new("admin")).is_none());
    }

    #[test]
    fn test_entry_snapshot_with_unrepresentable_expiry() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        let ttl = Duration::from_secs(100_000 * 365 * 24 * 3600 * 10);
        store.set("events", "", vec!["a"], staff.clone(), Some(ttl));

        let snapshot = store.entry(&"events", "", &staff).unwrap();
        assert!(!snapshot.expired);
        assert_eq!(snapshot.time_until_expiration, None);
        assert_eq!(store.get(&"events", "", &staff), Some(vec!["a"]));
    }

    #[test]
    fn test_epoch_tracks_bulk_invalidation_scope() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");
        let admin = Role::new("admin");

        let before = store.epoch();
        store.invalidate_type(&"events", RoleScope::Only(&staff));
        assert!(store.invalidated_since(&"events", &staff, before));
        assert!(!store.invalidated_since(&"events", &admin, before));
        assert!(!store.invalidated_since(&"donations", &staff, before));

        let before = store.epoch();
        store.invalidate_type(&"donations", RoleScope::All);
        assert!(store.invalidated_since(&"donations", &admin, before));
        assert!(!store.invalidated_since(&"events", &admin, before));

        let before = store.epoch();
        store.clear_role(&admin);
        assert!(store.invalidated_since(&"reports", &admin, before));
        assert!(!store.invalidated_since(&"reports", &staff, before));

        let before = store.epoch();
        store.clear_all();
        assert!(store.invalidated_since(&"reports", &staff, before));
    }

    #[test]
    fn test_coalesced_serve_counts_as_hit() {
        let (mut store, _) = store_with_clock();
        let staff = Role::new("staff");

        assert_eq!(store.get(&"events", "", &staff), None);
        store.set("events", "", vec!["a"], staff.clone(), None);
        assert_eq!(store.take_coalesced(&"events", "", &staff), Some(vec!["a"]));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }
}
