//! Per-tenant diff state.
//!
//! Turns successive full listings into Added/Modified/Deleted changes. The state
//! is owned by exactly one worker and never shared.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use pollcast_proto::{
    CoreStateSignature, Resource, ResourceKey, ResourceProjection, SemanticState,
};

/// A semantic change detected between two polls.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Resource observed for at least the settling duration.
    Added(ResourceProjection),
    /// Resource changed in a way a human cares about.
    Modified(ResourceProjection),
    /// Resource no longer listed; carries its last known projection.
    Deleted(ResourceProjection),
}

impl Change {
    /// Projection carried by the change.
    pub fn resource(&self) -> &ResourceProjection {
        match self {
            Change::Added(r) | Change::Modified(r) | Change::Deleted(r) => r,
        }
    }
}

/// Diff state for one tenant across all watched kinds.
///
/// A key still inside its settling window has an entry in `first_observed` and
/// `last_semantic` but none in `last_core`, so it keeps being treated as new
/// until its `Added` change is produced.
#[derive(Debug)]
pub struct DiffState {
    settling: Duration,
    last_core: HashMap<ResourceKey, CoreStateSignature>,
    last_semantic: HashMap<ResourceKey, SemanticState>,
    first_observed: HashMap<ResourceKey, Instant>,
    last_projection: HashMap<ResourceKey, ResourceProjection>,
}

impl DiffState {
    /// Create empty state with the given settling duration.
    pub fn new(settling: Duration) -> Self {
        Self {
            settling,
            last_core: HashMap::new(),
            last_semantic: HashMap::new(),
            first_observed: HashMap::new(),
            last_projection: HashMap::new(),
        }
    }

    /// Apply a full listing of `kind` observed at `now`.
    pub fn apply(&mut self, kind: &str, items: &[Resource], now: Instant) -> Vec<Change> {
        let mut changes = Vec::new();
        let mut seen = HashSet::with_capacity(items.len());

        for item in items {
            let key = item.key(kind);
            if !seen.insert(key.clone()) {
                continue;
            }

            let projection = item.project();
            let core = CoreStateSignature::of(item);
            let semantic = SemanticState::from_projection(&projection);

            match self.last_core.get(&key) {
                None => {
                    let first = *self.first_observed.entry(key.clone()).or_insert(now);
                    self.last_semantic.insert(key.clone(), semantic);
                    self.last_projection.insert(key.clone(), projection.clone());

                    if now.saturating_duration_since(first) >= self.settling {
                        self.last_core.insert(key, core);
                        changes.push(Change::Added(projection));
                    }
                }
                Some(previous) if *previous == core => {}
                Some(_) => {
                    let notify = match self.last_semantic.get(&key) {
                        Some(previous) => {
                            previous.signature() != semantic.signature()
                                && semantic.is_meaningful_change_from(previous)
                        }
                        None => false,
                    };

                    self.last_core.insert(key.clone(), core);
                    self.last_semantic.insert(key.clone(), semantic);
                    self.last_projection.insert(key, projection.clone());

                    if notify {
                        changes.push(Change::Modified(projection));
                    }
                }
            }
        }

        let mut gone: Vec<ResourceKey> = self
            .first_observed
            .keys()
            .filter(|key| key.kind == kind && !seen.contains(*key))
            .cloned()
            .collect();
        gone.sort();

        for key in gone {
            let projection = self.forget(&key).unwrap_or_else(|| {
                let mut p = ResourceProjection::default();
                p.metadata.name = key.name.clone();
                p.metadata.namespace = key.namespace.clone();
                p
            });
            changes.push(Change::Deleted(projection));
        }

        changes
    }

    /// Drop every entry for `key`, returning its last projection.
    fn forget(&mut self, key: &ResourceKey) -> Option<ResourceProjection> {
        self.last_core.remove(key);
        self.last_semantic.remove(key);
        self.first_observed.remove(key);
        self.last_projection.remove(key)
    }

    /// Whether any map still holds an entry for `key`.
    pub fn is_tracked(&self, key: &ResourceKey) -> bool {
        self.last_core.contains_key(key)
            || self.last_semantic.contains_key(key)
            || self.first_observed.contains_key(key)
            || self.last_projection.contains_key(key)
    }

    /// Whether `key` has been reported as added.
    pub fn is_announced(&self, key: &ResourceKey) -> bool {
        self.last_core.contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.first_observed.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.first_observed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollcast_proto::{Condition, ReadinessStatus};

    const KIND: &str = "Kustomization";

    fn resource(name: &str, version: u64, revision: &str, ready: ReadinessStatus) -> Resource {
        let mut r = Resource::default();
        r.metadata.name = name.into();
        r.metadata.namespace = "flux-system".into();
        r.metadata.uid = format!("uid-{}", name);
        r.metadata.generation = Some(1);
        r.metadata.resource_version = Some(version.to_string());
        r.status.last_applied_revision = Some(revision.into());
        r.status.conditions = vec![Condition::ready(ready, "Reason", "message")];
        r
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new(KIND, "flux-system", name)
    }

    fn settled() -> (DiffState, Instant) {
        let start = Instant::now();
        let mut state = DiffState::new(Duration::ZERO);
        let changes = state.apply(KIND, &[resource("apps", 1, "r1", ReadinessStatus::Ready)], start);
        assert!(matches!(changes.as_slice(), [Change::Added(_)]));
        (state, start)
    }

    #[test]
    fn test_settling_suppresses_then_adds_once() {
        let start = Instant::now();
        let settling = Duration::from_secs(30);
        let mut state = DiffState::new(settling);
        let items = [resource("apps", 1, "r1", ReadinessStatus::Ready)];

        for secs in (0..30).step_by(5) {
            let changes = state.apply(KIND, &items, start + Duration::from_secs(secs));
            assert!(changes.is_empty(), "no Added before settling, t={}s", secs);
            assert!(state.is_tracked(&key("apps")));
            assert!(!state.is_announced(&key("apps")));
        }

        let changes = state.apply(KIND, &items, start + Duration::from_secs(30));
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], Change::Added(_)));

        let changes = state.apply(KIND, &items, start + Duration::from_secs(35));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_zero_settling_adds_immediately() {
        let (state, _) = settled();
        assert!(state.is_announced(&key("apps")));
    }

    #[test]
    fn test_unchanged_core_is_silent() {
        let (mut state, start) = settled();
        let items = [resource("apps", 1, "r1", ReadinessStatus::Ready)];
        for i in 1..5 {
            assert!(state.apply(KIND, &items, start + Duration::from_secs(i)).is_empty());
        }
    }

    #[test]
    fn test_core_change_without_semantic_change_is_silent() {
        let (mut state, start) = settled();
        for version in 2..6 {
            let items = [resource("apps", version, "r1", ReadinessStatus::Ready)];
            assert!(state
                .apply(KIND, &items, start + Duration::from_secs(version))
                .is_empty());
        }
    }

    #[test]
    fn test_revision_change_emits_modified() {
        let (mut state, start) = settled();
        let items = [resource("apps", 2, "r2", ReadinessStatus::Ready)];
        let changes = state.apply(KIND, &items, start + Duration::from_secs(5));

        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Change::Modified(p) => {
                assert_eq!(p.status.last_applied_revision.as_deref(), Some("r2"))
            }
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn test_failure_then_silent_recovery() {
        let (mut state, start) = settled();

        let failed = [resource("apps", 2, "r1", ReadinessStatus::Failed)];
        let changes = state.apply(KIND, &failed, start + Duration::from_secs(5));
        assert!(matches!(changes.as_slice(), [Change::Modified(_)]));

        // Recovery on the same revision does not notify.
        let recovered = [resource("apps", 3, "r1", ReadinessStatus::Ready)];
        assert!(state
            .apply(KIND, &recovered, start + Duration::from_secs(10))
            .is_empty());
    }

    #[test]
    fn test_recovery_with_new_revision_notifies() {
        let (mut state, start) = settled();
        state.apply(
            KIND,
            &[resource("apps", 2, "r1", ReadinessStatus::Failed)],
            start + Duration::from_secs(5),
        );

        let changes = state.apply(
            KIND,
            &[resource("apps", 3, "r2", ReadinessStatus::Ready)],
            start + Duration::from_secs(10),
        );
        assert!(matches!(changes.as_slice(), [Change::Modified(_)]));
    }

    #[test]
    fn test_unknown_readiness_is_silent() {
        let (mut state, start) = settled();
        let items = [resource("apps", 2, "r1", ReadinessStatus::Unknown)];
        assert!(state
            .apply(KIND, &items, start + Duration::from_secs(5))
            .is_empty());
    }

    #[test]
    fn test_deletion_exactly_once() {
        let (mut state, start) = settled();

        let changes = state.apply(KIND, &[], start + Duration::from_secs(5));
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Change::Deleted(p) => {
                assert_eq!(p.metadata.name, "apps");
                assert_eq!(p.metadata.uid, "uid-apps");
            }
            other => panic!("unexpected change {:?}", other),
        }
        assert!(!state.is_tracked(&key("apps")));
        assert!(state.is_empty());

        assert!(state.apply(KIND, &[], start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_deletion_is_scoped_to_kind() {
        let (mut state, start) = settled();
        let changes = state.apply("HelmRelease", &[], start + Duration::from_secs(5));
        assert!(changes.is_empty());
        assert!(state.is_tracked(&key("apps")));
    }

    #[test]
    fn test_reappearing_resource_settles_again() {
        let start = Instant::now();
        let mut state = DiffState::new(Duration::from_secs(10));
        let items = [resource("apps", 1, "r1", ReadinessStatus::Ready)];

        state.apply(KIND, &items, start);
        let added = state.apply(KIND, &items, start + Duration::from_secs(10));
        assert_eq!(added.len(), 1);

        state.apply(KIND, &[], start + Duration::from_secs(15));
        assert!(state
            .apply(KIND, &items, start + Duration::from_secs(20))
            .is_empty());
        let added = state.apply(KIND, &items, start + Duration::from_secs(30));
        assert!(matches!(added.as_slice(), [Change::Added(_)]));
    }

    #[test]
    fn test_duplicate_names_in_listing_are_ignored() {
        let start = Instant::now();
        let mut state = DiffState::new(Duration::ZERO);
        let items = [
            resource("apps", 1, "r1", ReadinessStatus::Ready),
            resource("apps", 1, "r1", ReadinessStatus::Ready),
        ];
        let changes = state.apply(KIND, &items, start);
        assert_eq!(changes.len(), 1);
    }
}
