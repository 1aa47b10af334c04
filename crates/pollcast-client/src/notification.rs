//! Client notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pollcast_proto::{ChangeEvent, EventType, ReadinessStatus};

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification accepted from the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientNotification {
    pub id: Uuid,
    pub tenant_id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub resource_kind: Option<String>,
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub resource_namespace: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl ClientNotification {
    /// Build the notification for `event`, received for `tenant_id`.
    ///
    /// | event | severity | title |
    /// |---|---|---|
    /// | `ADDED` | info | `{Kind} {name} created` |
    /// | `DELETED` | warning | `{Kind} {name} deleted` |
    /// | `MODIFIED`, Ready=False | error | `{Kind} {name} failed` |
    /// | `MODIFIED`, Ready=True | success | `{Kind} {name} reconciled` |
    /// | `MODIFIED`, otherwise | info | `{Kind} {name} updated` |
    /// | `ERROR` | error | `{Kind} {name} error` |
    pub fn from_event(event: &ChangeEvent, tenant_id: &str) -> Self {
        let kind = event.resource_type.clone();
        let resource = event.resource.as_ref();
        let name = resource.map(|r| r.metadata.name.clone());
        let namespace = resource.map(|r| r.metadata.namespace.clone());
        let readiness = resource
            .map(|r| r.readiness())
            .unwrap_or(ReadinessStatus::Unknown);

        let subject = match (&kind, &name) {
            (Some(kind), Some(name)) => format!("{} {}", kind, name),
            (None, Some(name)) => name.clone(),
            (Some(kind), None) => kind.clone(),
            (None, None) => "Watch".to_string(),
        };

        let (severity, verb) = match event.event_type {
            EventType::Added => (Severity::Info, "created"),
            EventType::Deleted => (Severity::Warning, "deleted"),
            EventType::Modified => match readiness {
                ReadinessStatus::Failed => (Severity::Error, "failed"),
                ReadinessStatus::Ready => (Severity::Success, "reconciled"),
                ReadinessStatus::Unknown => (Severity::Info, "updated"),
            },
            _ => (Severity::Error, "error"),
        };

        let condition_message = resource
            .and_then(|r| r.ready_condition())
            .and_then(|c| c.message.clone())
            .filter(|m| !m.is_empty());

        let message = match event.event_type {
            EventType::Error => event.message.clone().or(condition_message),
            _ => condition_message.or_else(|| event.message.clone()),
        }
        .unwrap_or_else(|| match (&namespace, &name) {
            (Some(namespace), Some(name)) => format!("{}/{} {}", namespace, name, verb),
            _ => format!("{} {}", subject, verb),
        });

        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            severity,
            title: format!("{} {}", subject, verb),
            message,
            resource_kind: kind,
            resource_name: name,
            resource_namespace: namespace,
            timestamp: event.timestamp,
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollcast_proto::{Condition, ResourceProjection};

    fn projection(ready: ReadinessStatus, message: &str) -> ResourceProjection {
        let mut p = ResourceProjection::default();
        p.metadata.name = "apps".into();
        p.metadata.namespace = "flux-system".into();
        p.status.conditions = vec![Condition::ready(ready, "Reason", message)];
        p
    }

    #[test]
    fn test_titles_and_severities() {
        let cases = [
            (
                ChangeEvent::added("t", "Kustomization", projection(ReadinessStatus::Ready, "")),
                Severity::Info,
                "Kustomization apps created",
            ),
            (
                ChangeEvent::deleted("t", "Kustomization", projection(ReadinessStatus::Ready, "")),
                Severity::Warning,
                "Kustomization apps deleted",
            ),
            (
                ChangeEvent::modified("t", "Kustomization", projection(ReadinessStatus::Failed, "")),
                Severity::Error,
                "Kustomization apps failed",
            ),
            (
                ChangeEvent::modified("t", "Kustomization", projection(ReadinessStatus::Ready, "")),
                Severity::Success,
                "Kustomization apps reconciled",
            ),
            (
                ChangeEvent::modified("t", "Kustomization", projection(ReadinessStatus::Unknown, "")),
                Severity::Info,
                "Kustomization apps updated",
            ),
            (
                ChangeEvent::error(
                    "t",
                    "Kustomization",
                    projection(ReadinessStatus::Failed, ""),
                    "boom",
                ),
                Severity::Error,
                "Kustomization apps error",
            ),
        ];

        for (event, severity, title) in cases {
            let n = ClientNotification::from_event(&event, "t");
            assert_eq!(n.severity, severity, "{}", title);
            assert_eq!(n.title, title);
            assert!(!n.read);
        }
    }

    #[test]
    fn test_message_prefers_condition_message() {
        let event = ChangeEvent::modified(
            "t",
            "HelmRelease",
            projection(ReadinessStatus::Failed, "install retries exhausted"),
        );
        let n = ClientNotification::from_event(&event, "t");
        assert_eq!(n.message, "install retries exhausted");
        assert_eq!(n.resource_kind.as_deref(), Some("HelmRelease"));
        assert_eq!(n.resource_namespace.as_deref(), Some("flux-system"));
        assert_eq!(n.timestamp, event.timestamp);
    }

    #[test]
    fn test_message_falls_back_to_resource_path() {
        let event = ChangeEvent::added("t", "Kustomization", projection(ReadinessStatus::Ready, ""));
        let n = ClientNotification::from_event(&event, "t");
        assert_eq!(n.message, "flux-system/apps created");
    }

    #[test]
    fn test_serialized_field_names() {
        let event = ChangeEvent::added("t", "Kustomization", projection(ReadinessStatus::Ready, ""));
        let json = serde_json::to_value(ClientNotification::from_event(&event, "t")).unwrap();
        assert_eq!(json["tenantId"], "t");
        assert_eq!(json["severity"], "info");
        assert_eq!(json["resourceName"], "apps");
        assert_eq!(json["read"], false);
    }
}
