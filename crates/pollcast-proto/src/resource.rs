//! Resource shapes: the raw listed object, its key and its minimal projection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Condition type that carries readiness.
pub const READY_CONDITION: &str = "Ready";

/// Identity of a watched object within one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource kind (e.g. "Kustomization").
    pub kind: String,
    /// Object namespace; empty for cluster-scoped objects.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ResourceKey {
    /// Create a new resource key.
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Full listing returned by a resource lister.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceList {
    /// Every object of the requested kind that currently exists.
    #[serde(default)]
    pub items: Vec<Resource>,
}

impl ResourceList {
    /// Create a listing from items.
    pub fn new(items: Vec<Resource>) -> Self {
        Self { items }
    }
}

/// A listed object as returned by the upstream API.
///
/// Only the fields used for diffing are typed; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: ResourceStatus,
}

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// Reconciliation status reported by the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempted_revision: Option<String>,
    /// Source artifact (source kinds report their revision here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Artifact produced by a source object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub revision: Option<String>,
}

/// A status condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Create a Ready condition.
    pub fn ready(status: ReadinessStatus, reason: &str, message: &str) -> Self {
        Self {
            condition_type: READY_CONDITION.to_string(),
            status: status.as_str().to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_transition_time: None,
        }
    }
}

/// Readiness derived from the Ready condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadinessStatus {
    /// Ready=True.
    Ready,
    /// Ready=False.
    Failed,
    /// Ready=Unknown or no Ready condition (reconciliation in progress).
    Unknown,
}

impl ReadinessStatus {
    /// Parse a Kubernetes condition status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "True" => ReadinessStatus::Ready,
            "False" => ReadinessStatus::Failed,
            _ => ReadinessStatus::Unknown,
        }
    }

    /// Condition status string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Ready => "True",
            ReadinessStatus::Failed => "False",
            ReadinessStatus::Unknown => "Unknown",
        }
    }
}

impl Resource {
    /// Key of this object when listed as `kind`.
    pub fn key(&self, kind: &str) -> ResourceKey {
        ResourceKey::new(kind, &self.metadata.namespace, &self.metadata.name)
    }

    /// The Ready condition, if reported.
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == READY_CONDITION)
    }

    /// Latest applied revision, falling back to the source artifact revision.
    pub fn revision(&self) -> Option<&str> {
        self.status
            .last_applied_revision
            .as_deref()
            .or_else(|| self.status.artifact.as_ref()?.revision.as_deref())
    }

    /// Minimal projection sent to clients.
    pub fn project(&self) -> ResourceProjection {
        ResourceProjection {
            metadata: ProjectedMetadata {
                name: self.metadata.name.clone(),
                namespace: self.metadata.namespace.clone(),
                uid: self.metadata.uid.clone(),
            },
            status: ProjectedStatus {
                conditions: self.ready_condition().cloned().into_iter().collect(),
                last_applied_revision: self.revision().map(str::to_string),
            },
        }
    }
}

/// Narrow, explicitly typed view of a resource carried in change events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProjection {
    #[serde(default)]
    pub metadata: ProjectedMetadata,
    #[serde(default)]
    pub status: ProjectedStatus,
}

/// Identifying metadata of a projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
}

/// Status subset of a projection: the Ready condition and the applied revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_revision: Option<String>,
}

impl ResourceProjection {
    /// The Ready condition, if present.
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == READY_CONDITION)
    }

    /// Readiness; `Unknown` when no Ready condition is reported.
    pub fn readiness(&self) -> ReadinessStatus {
        self.ready_condition()
            .map(|c| ReadinessStatus::parse(&c.status))
            .unwrap_or(ReadinessStatus::Unknown)
    }

    /// Key of this projection for the given kind.
    pub fn key(&self, kind: &str) -> ResourceKey {
        ResourceKey::new(kind, &self.metadata.namespace, &self.metadata.name)
    }
}
