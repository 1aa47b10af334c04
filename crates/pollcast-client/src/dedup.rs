//! Client-side semantic state cache.
//!
//! Mirrors the server's last semantic state per resource so that a replayed
//! `MODIFIED` event carrying an already-seen state is discarded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pollcast_proto::SemanticStateSignature;

/// Cache key of a resource within a tenant.
pub fn cache_key(tenant_id: &str, kind: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}/{}", tenant_id, kind, namespace, name)
}

/// Last accepted semantic signature per resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupCache {
    entries: BTreeMap<String, SemanticStateSignature>,
}

impl DedupCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&SemanticStateSignature> {
        self.entries.get(key)
    }

    /// Whether `signature` equals the one recorded for `key`.
    pub fn is_duplicate(&self, key: &str, signature: &SemanticStateSignature) -> bool {
        self.entries.get(key) == Some(signature)
    }

    /// Record `signature` as the latest state of `key`.
    pub fn record(&mut self, key: String, signature: SemanticStateSignature) {
        self.entries.insert(key, signature);
    }

    /// Forget `key`.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Forget every entry of `tenant_id`. Returns the number removed.
    pub fn purge_tenant(&mut self, tenant_id: &str) -> usize {
        let prefix = format!("{}/", tenant_id);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        before - self.entries.len()
    }

    /// Keep only the entries whose key satisfies `keep`. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(key));
        before - self.entries.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
