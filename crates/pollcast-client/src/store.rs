//! Bounded, persisted notification log.
//!
//! All mutations take one lock, update the in-memory log and dedup cache, and
//! write both to storage before releasing it. Read projections are derived from
//! the current log on every call.
//!
//! Evicting old notifications also drops cache entries that no retained
//! notification refers to, so the cache never outgrows the log.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use pollcast_proto::{ChangeEvent, EventType, SemanticState, MESSAGE_PREFIX_LEN};

use crate::config::{ClientConfig, DEFAULT_MAX_NOTIFICATIONS};
use crate::dedup::{cache_key, DedupCache};
use crate::notification::ClientNotification;
use crate::persistence::{MemoryStorage, StateStorage};

#[derive(Debug, Default)]
struct StoreState {
    /// Newest first.
    notifications: Vec<ClientNotification>,
    cache: DedupCache,
}

impl StoreState {
    /// Drop notifications beyond `max` along with cache entries no retained
    /// notification refers to. Returns `(evicted, pruned)`.
    fn evict_beyond(&mut self, max: usize) -> (usize, usize) {
        if self.notifications.len() <= max {
            return (0, 0);
        }
        let evicted = self.notifications.len() - max;
        self.notifications.truncate(max);

        let retained: HashSet<String> =
            self.notifications.iter().filter_map(notification_key).collect();
        let pruned = self.cache.retain(|key| retained.contains(key));
        (evicted, pruned)
    }
}

/// Notification log with read/unread state and a dedup cache.
pub struct NotificationStore {
    state: Mutex<StoreState>,
    storage: Arc<dyn StateStorage>,
    max_notifications: usize,
    message_prefix_len: usize,
}

impl NotificationStore {
    /// Open the store, restoring state from `storage`.
    ///
    /// Unreadable or corrupt blobs are discarded and the store starts empty.
    pub fn open(
        storage: Arc<dyn StateStorage>,
        max_notifications: usize,
        message_prefix_len: usize,
    ) -> Self {
        let mut state = load_state(storage.as_ref());
        state.evict_beyond(max_notifications);

        debug!(
            notifications = state.notifications.len(),
            cached = state.cache.len(),
            "notification store opened"
        );

        Self {
            state: Mutex::new(state),
            storage,
            max_notifications,
            message_prefix_len,
        }
    }

    /// Open the store with the limits from `config`.
    pub fn from_config(config: &ClientConfig, storage: Arc<dyn StateStorage>) -> Self {
        Self::open(storage, config.max_notifications, config.message_prefix_len)
    }

    /// A store that persists nowhere but memory.
    pub fn in_memory() -> Self {
        Self::open(
            Arc::new(MemoryStorage::new()),
            DEFAULT_MAX_NOTIFICATIONS,
            MESSAGE_PREFIX_LEN,
        )
    }

    /// Accept `event` into the log.
    ///
    /// Returns the stored notification, or `None` if the event carries nothing
    /// to notify about or is a `MODIFIED` replay of an already-seen state.
    pub fn ingest(&self, event: &ChangeEvent) -> Option<ClientNotification> {
        if !event.event_type.is_resource_event() {
            return None;
        }

        let tenant = event.tenant_id.as_deref().unwrap_or_default();
        let mut state = self.state.lock();

        if let (Some(resource), Some(kind)) = (&event.resource, event.resource_type.as_deref()) {
            let key = cache_key(
                tenant,
                kind,
                &resource.metadata.namespace,
                &resource.metadata.name,
            );
            let signature =
                SemanticState::from_projection_with_prefix(resource, self.message_prefix_len)
                    .signature();

            if event.event_type == EventType::Modified && state.cache.is_duplicate(&key, &signature)
            {
                trace!(tenant, key = %key, "duplicate semantic state discarded");
                return None;
            }
            state.cache.record(key, signature);
        }

        let notification = ClientNotification::from_event(event, tenant);
        state.notifications.insert(0, notification.clone());
        let (evicted, pruned) = state.evict_beyond(self.max_notifications);
        if evicted > 0 {
            trace!(evicted, pruned, "oldest notifications evicted");
        }

        self.persist(&state);
        Some(notification)
    }

    /// Mark one notification read.
    pub fn mark_read(&self, id: Uuid) -> bool {
        self.set_read(id, true)
    }

    /// Mark one notification unread.
    pub fn mark_unread(&self, id: Uuid) -> bool {
        self.set_read(id, false)
    }

    fn set_read(&self, id: Uuid, read: bool) -> bool {
        let mut state = self.state.lock();
        let Some(notification) = state.notifications.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        notification.read = read;
        self.persist(&state);
        true
    }

    /// Mark every notification read, or only those of `tenant_id`.
    ///
    /// Returns the number of notifications that changed.
    pub fn mark_all_read(&self, tenant_id: Option<&str>) -> usize {
        let mut state = self.state.lock();
        let mut changed = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| !n.read && tenant_id.map_or(true, |t| n.tenant_id == t))
        {
            notification.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.persist(&state);
        }
        changed
    }

    /// Delete one notification and forget its resource's cached state.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.notifications.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = state.notifications.remove(index);
        if let Some(key) = notification_key(&removed) {
            state.cache.remove(&key);
        }
        self.persist(&state);
        true
    }

    /// Delete every notification, or only those of `tenant_id`, together with
    /// the matching cache entries. Returns the number of notifications removed.
    pub fn clear(&self, tenant_id: Option<&str>) -> usize {
        let mut state = self.state.lock();
        let before = state.notifications.len();
        match tenant_id {
            Some(tenant) => {
                state.notifications.retain(|n| n.tenant_id != tenant);
                state.cache.purge_tenant(tenant);
            }
            None => {
                state.notifications.clear();
                state.cache.clear();
            }
        }
        let removed = before - state.notifications.len();
        self.persist(&state);
        removed
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.state.lock().notifications.iter().filter(|n| !n.read).count()
    }

    /// Unread notifications per tenant. Tenants without unread entries are omitted.
    pub fn unread_by_tenant(&self) -> BTreeMap<String, usize> {
        let state = self.state.lock();
        let mut counts = BTreeMap::new();
        for notification in state.notifications.iter().filter(|n| !n.read) {
            *counts.entry(notification.tenant_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// All notifications, newest first.
    pub fn notifications(&self) -> Vec<ClientNotification> {
        self.state.lock().notifications.clone()
    }

    /// Notifications of `tenant_id`, newest first.
    pub fn notifications_for(&self, tenant_id: &str) -> Vec<ClientNotification> {
        self.state
            .lock()
            .notifications
            .iter()
            .filter(|n| n.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// Look up one notification.
    pub fn get(&self, id: Uuid) -> Option<ClientNotification> {
        self.state
            .lock()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().notifications.is_empty()
    }

    /// Number of resources with a cached semantic state.
    pub fn cached_states(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn max_notifications(&self) -> usize {
        self.max_notifications
    }

    fn persist(&self, state: &StoreState) {
        let notifications = match serde_json::to_vec(&state.notifications) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode notification log");
                return;
            }
        };
        let cache = match serde_json::to_vec(&state.cache) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode dedup cache");
                return;
            }
        };
        if let Err(e) = self.storage.save(&notifications, &cache) {
            warn!(error = %e, "failed to persist notification state");
        }
    }
}

fn notification_key(notification: &ClientNotification) -> Option<String> {
    Some(cache_key(
        &notification.tenant_id,
        notification.resource_kind.as_deref()?,
        notification.resource_namespace.as_deref()?,
        notification.resource_name.as_deref()?,
    ))
}

fn load_state(storage: &dyn StateStorage) -> StoreState {
    let blobs = match storage.load() {
        Ok(blobs) => blobs,
        Err(e) => {
            warn!(error = %e, "failed to load notification state; starting empty");
            return StoreState::default();
        }
    };

    let notifications = blobs
        .notifications
        .map(|bytes| {
            serde_json::from_slice::<Vec<ClientNotification>>(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "discarding corrupt notification log");
                Vec::new()
            })
        })
        .unwrap_or_default();

    let cache = blobs
        .dedup_cache
        .map(|bytes| {
            serde_json::from_slice::<DedupCache>(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "discarding corrupt dedup cache");
                DedupCache::default()
            })
        })
        .unwrap_or_default();

    StoreState {
        notifications,
        cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollcast_proto::{Condition, ReadinessStatus, ResourceProjection};

    use crate::persistence::PersistedBlobs;

    fn projection(name: &str, revision: &str, ready: ReadinessStatus) -> ResourceProjection {
        let mut p = ResourceProjection::default();
        p.metadata.name = name.into();
        p.metadata.namespace = "flux-system".into();
        p.status.last_applied_revision = Some(revision.into());
        p.status.conditions = vec![Condition::ready(ready, "Reason", "message")];
        p
    }

    fn modified(tenant: &str, name: &str, revision: &str) -> ChangeEvent {
        ChangeEvent::modified(
            tenant,
            "Kustomization",
            projection(name, revision, ReadinessStatus::Ready),
        )
    }

    fn store_with(storage: Arc<MemoryStorage>, max: usize) -> NotificationStore {
        NotificationStore::open(storage, max, MESSAGE_PREFIX_LEN)
    }

    #[test]
    fn test_replayed_modified_is_stored_once() {
        let store = NotificationStore::in_memory();
        let event = modified("t", "apps", "r1");

        assert!(store.ingest(&event).is_some());
        assert!(store.ingest(&event).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_added_and_deleted_are_never_suppressed() {
        let store = NotificationStore::in_memory();
        let p = projection("apps", "r1", ReadinessStatus::Ready);

        store.ingest(&ChangeEvent::added("t", "Kustomization", p.clone()));
        store.ingest(&ChangeEvent::deleted("t", "Kustomization", p.clone()));
        store.ingest(&ChangeEvent::added("t", "Kustomization", p.clone()));
        store.ingest(&ChangeEvent::added("t", "Kustomization", p));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_bookkeeping_events_are_ignored() {
        let store = NotificationStore::in_memory();
        assert!(store.ingest(&ChangeEvent::connected("t")).is_none());
        assert!(store.ingest(&ChangeEvent::heartbeat("t")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_log_is_bounded_newest_first() {
        let store = store_with(Arc::new(MemoryStorage::new()), 3);
        for i in 0..5 {
            store.ingest(&modified("t", &format!("app-{}", i), "r1"));
        }

        let names: Vec<String> = store
            .notifications()
            .into_iter()
            .filter_map(|n| n.resource_name)
            .collect();
        assert_eq!(names, vec!["app-4", "app-3", "app-2"]);
    }

    #[test]
    fn test_eviction_prunes_orphaned_cache_entries() {
        let store = store_with(Arc::new(MemoryStorage::new()), 2);
        store.ingest(&modified("t", "app-0", "r1"));
        store.ingest(&modified("t", "app-1", "r1"));
        store.ingest(&modified("t", "app-1", "r2"));
        assert_eq!(store.cached_states(), 1);

        for i in 2..20 {
            store.ingest(&modified("t", &format!("app-{}", i), "r1"));
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.cached_states(), 2);

        // Retained resources still suppress their replays.
        assert!(store.ingest(&modified("t", "app-19", "r1")).is_none());
    }

    #[test]
    fn test_read_state_and_projections() {
        let store = NotificationStore::in_memory();
        let a = store.ingest(&modified("a", "apps", "r1")).unwrap();
        store.ingest(&modified("a", "infra", "r1"));
        store.ingest(&modified("b", "apps", "r1"));

        assert_eq!(store.unread_count(), 3);
        assert!(store.mark_read(a.id));
        assert_eq!(store.unread_count(), 2);
        assert_eq!(store.unread_by_tenant().get("a"), Some(&1));

        assert!(store.mark_unread(a.id));
        assert_eq!(store.unread_count(), 3);

        assert_eq!(store.mark_all_read(Some("a")), 2);
        assert_eq!(store.unread_by_tenant().get("a"), None);
        assert_eq!(store.unread_by_tenant().get("b"), Some(&1));

        assert_eq!(store.mark_all_read(None), 1);
        assert_eq!(store.unread_count(), 0);
        assert!(!store.mark_read(Uuid::new_v4()));
    }

    #[test]
    fn test_remove_purges_cache_entry() {
        let store = NotificationStore::in_memory();
        let event = modified("t", "apps", "r1");
        let n = store.ingest(&event).unwrap();

        assert!(store.remove(n.id));
        assert_eq!(store.cached_states(), 0);
        assert!(store.ingest(&event).is_some());
    }

    #[test]
    fn test_clear_tenant_is_scoped() {
        let store = NotificationStore::in_memory();
        store.ingest(&modified("a", "apps", "r1"));
        store.ingest(&modified("b", "apps", "r1"));

        assert_eq!(store.clear(Some("a")), 1);
        assert_eq!(store.notifications_for("a").len(), 0);
        assert_eq!(store.notifications_for("b").len(), 1);

        assert!(store.ingest(&modified("a", "apps", "r1")).is_some());
        assert!(store.ingest(&modified("b", "apps", "r1")).is_none());

        assert_eq!(store.clear(None), 2);
        assert_eq!(store.cached_states(), 0);
    }

    #[test]
    fn test_restart_restores_log_and_cache() {
        let storage = Arc::new(MemoryStorage::new());
        let event = modified("t", "apps", "r1");
        {
            let store = store_with(storage.clone(), 10);
            store.ingest(&event);
        }

        let store = store_with(storage, 10);
        assert_eq!(store.len(), 1);
        assert!(store.ingest(&event).is_none());
    }

    #[test]
    fn test_corrupt_blobs_start_empty() {
        let storage = Arc::new(MemoryStorage::with_blobs(PersistedBlobs {
            notifications: Some(b"not json".to_vec()),
            dedup_cache: Some(b"{\"truncated".to_vec()),
        }));
        let store = store_with(storage, 10);
        assert!(store.is_empty());
        assert_eq!(store.cached_states(), 0);
    }

    #[test]
    fn test_storage_failures_are_not_fatal() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);

        let store = store_with(storage.clone(), 10);
        assert!(store.ingest(&modified("t", "apps", "r1")).is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(storage.blobs(), PersistedBlobs::default());
    }
}
