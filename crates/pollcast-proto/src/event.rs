//! Change events pushed to subscribers.
//!
//! Each event is one JSON object on the wire:
//!
//! ```text
//! { "type": "MODIFIED", "tenantId": "prod", "resourceType": "Kustomization",
//!   "resource": { "metadata": {...}, "status": {...} },
//!   "message": null, "timestamp": "2024-01-01T00:00:00Z" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::resource::{ResourceKey, ResourceProjection};

/// Kind of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Subscription established.
    Connected,
    /// Resource appeared (after settling).
    Added,
    /// Resource changed meaningfully.
    Modified,
    /// Resource disappeared from the listing.
    Deleted,
    /// Liveness signal.
    Heartbeat,
    /// Resource-scoped error reported by the server.
    Error,
    /// Any type this build does not know about.
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Whether this type describes a resource change.
    pub fn is_resource_event(&self) -> bool {
        matches!(
            self,
            EventType::Added | EventType::Modified | EventType::Deleted | EventType::Error
        )
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Connected => "CONNECTED",
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Heartbeat => "HEARTBEAT",
            EventType::Error => "ERROR",
            EventType::Unknown => "UNKNOWN",
        }
    }
}

/// A change event for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceProjection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    fn bare(event_type: EventType, tenant_id: &str) -> Self {
        Self {
            event_type,
            tenant_id: Some(tenant_id.to_string()),
            resource_type: None,
            resource: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    fn for_resource(
        event_type: EventType,
        tenant_id: &str,
        kind: &str,
        resource: ResourceProjection,
    ) -> Self {
        Self {
            resource_type: Some(kind.to_string()),
            resource: Some(resource),
            ..Self::bare(event_type, tenant_id)
        }
    }

    /// Subscription confirmation.
    pub fn connected(tenant_id: &str) -> Self {
        Self {
            message: Some(format!("watching tenant {}", tenant_id)),
            ..Self::bare(EventType::Connected, tenant_id)
        }
    }

    /// Liveness signal.
    pub fn heartbeat(tenant_id: &str) -> Self {
        Self::bare(EventType::Heartbeat, tenant_id)
    }

    /// Resource added.
    pub fn added(tenant_id: &str, kind: &str, resource: ResourceProjection) -> Self {
        Self::for_resource(EventType::Added, tenant_id, kind, resource)
    }

    /// Resource modified.
    pub fn modified(tenant_id: &str, kind: &str, resource: ResourceProjection) -> Self {
        Self::for_resource(EventType::Modified, tenant_id, kind, resource)
    }

    /// Resource deleted.
    pub fn deleted(tenant_id: &str, kind: &str, resource: ResourceProjection) -> Self {
        Self::for_resource(EventType::Deleted, tenant_id, kind, resource)
    }

    /// Resource-scoped error.
    pub fn error(
        tenant_id: &str,
        kind: &str,
        resource: ResourceProjection,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::for_resource(EventType::Error, tenant_id, kind, resource)
        }
    }

    /// Key of the carried resource, if any.
    pub fn resource_key(&self) -> Option<ResourceKey> {
        let kind = self.resource_type.as_deref()?;
        self.resource.as_ref().map(|r| r.key(kind))
    }

    /// Serialize to a single-line JSON message.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a JSON message.
    pub fn from_json(data: &str) -> Result<Self, Error> {
        serde_json::from_str(data).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
