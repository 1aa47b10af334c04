//! In-memory lister for demos and tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use pollcast_proto::{Resource, ResourceList};

use super::ResourceLister;
use crate::error::Error;

/// Lister serving snapshots stored in memory.
///
/// Unknown (tenant, kind) pairs list as empty. Failures can be injected per pair.
#[derive(Debug, Default)]
pub struct MemoryLister {
    snapshots: DashMap<(String, String), Vec<Resource>>,
    failing: DashSet<(String, String)>,
    calls: AtomicU64,
}

impl MemoryLister {
    /// Create an empty lister.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot of `kind` in `tenant`.
    pub fn set(&self, tenant: &str, kind: &str, items: Vec<Resource>) {
        self.snapshots
            .insert((tenant.to_string(), kind.to_string()), items);
    }

    /// Insert or replace a single object, matched by namespace and name.
    pub fn upsert(&self, tenant: &str, kind: &str, resource: Resource) {
        let mut items = self
            .snapshots
            .entry((tenant.to_string(), kind.to_string()))
            .or_default();
        match items.iter_mut().find(|r| {
            r.metadata.namespace == resource.metadata.namespace
                && r.metadata.name == resource.metadata.name
        }) {
            Some(existing) => *existing = resource,
            None => items.push(resource),
        }
    }

    /// Remove a single object.
    pub fn remove(&self, tenant: &str, kind: &str, namespace: &str, name: &str) {
        if let Some(mut items) = self
            .snapshots
            .get_mut(&(tenant.to_string(), kind.to_string()))
        {
            items.retain(|r| !(r.metadata.namespace == namespace && r.metadata.name == name));
        }
    }

    /// Make calls for `kind` in `tenant` fail (or succeed again).
    pub fn set_failing(&self, tenant: &str, kind: &str, failing: bool) {
        let key = (tenant.to_string(), kind.to_string());
        if failing {
            self.failing.insert(key);
        } else {
            self.failing.remove(&key);
        }
    }

    /// Total number of list calls served.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceLister for MemoryLister {
    async fn list(&self, tenant: &str, kind: &str) -> Result<ResourceList, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = (tenant.to_string(), kind.to_string());
        if self.failing.contains(&key) {
            return Err(Error::lister(tenant, kind, "injected failure"));
        }

        let items = self
            .snapshots
            .get(&key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(ResourceList::new(items))
    }
}
