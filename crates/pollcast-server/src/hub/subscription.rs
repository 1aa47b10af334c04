//! Subscription guard.

use std::sync::Weak;

use super::manager::BroadcastHub;

/// Keeps a subscriber registered with the hub.
///
/// Dropping the guard unsubscribes. If the hub is already gone the drop is a no-op.
pub struct Subscription {
    hub: Weak<BroadcastHub>,
    tenant: String,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(hub: Weak<BroadcastHub>, tenant: &str, id: u64) -> Self {
        Self {
            hub,
            tenant: tenant.to_string(),
            id,
        }
    }

    /// Subscriber id assigned by the hub.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tenant this subscription watches.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.tenant, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("tenant", &self.tenant)
            .field("id", &self.id)
            .finish()
    }
}
