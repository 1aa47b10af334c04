//! State signatures used to detect and judge changes between polls.
//!
//! A [`CoreStateSignature`] changes on every write to an object and only tells
//! us that *something* happened. A [`SemanticStateSignature`] covers the fields
//! a human cares about; two observations with equal semantic signatures never
//! produce a notification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::{ReadinessStatus, Resource, ResourceProjection};

/// Number of message characters that take part in the semantic signature.
pub const MESSAGE_PREFIX_LEN: usize = 100;

/// Opaque signature over write-counters of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoreStateSignature(String);

impl CoreStateSignature {
    /// Derive the signature from generation and version tokens.
    pub fn of(resource: &Resource) -> Self {
        let generation = resource
            .metadata
            .generation
            .map(|g| g.to_string())
            .unwrap_or_default();
        let version = resource.metadata.resource_version.as_deref().unwrap_or("");
        let observed = resource
            .status
            .observed_generation
            .map(|g| g.to_string())
            .unwrap_or_default();

        Self(format!("{}|{}|{}", generation, version, observed))
    }

    /// Signature as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque signature over the human-meaningful state of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemanticStateSignature(String);

impl SemanticStateSignature {
    /// Signature as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SemanticStateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SemanticStateSignature {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Human-meaningful state of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticState {
    pub name: String,
    pub revision: Option<String>,
    pub readiness: ReadinessStatus,
    pub reason: Option<String>,
    pub message_prefix: String,
}

impl SemanticState {
    /// Derive the semantic state of a projection.
    pub fn from_projection(projection: &ResourceProjection) -> Self {
        Self::from_projection_with_prefix(projection, MESSAGE_PREFIX_LEN)
    }

    /// Derive the semantic state keeping `prefix_len` message characters.
    pub fn from_projection_with_prefix(projection: &ResourceProjection, prefix_len: usize) -> Self {
        let ready = projection.ready_condition();

        Self {
            name: projection.metadata.name.clone(),
            revision: projection.status.last_applied_revision.clone(),
            readiness: projection.readiness(),
            reason: ready.and_then(|c| c.reason.clone()),
            message_prefix: ready
                .and_then(|c| c.message.as_deref())
                .map(|m| m.chars().take(prefix_len).collect())
                .unwrap_or_default(),
        }
    }

    /// Render the signature.
    pub fn signature(&self) -> SemanticStateSignature {
        SemanticStateSignature(format!(
            "{}|{}|{}|{}|{}",
            self.name,
            self.revision.as_deref().unwrap_or(""),
            self.readiness.as_str(),
            self.reason.as_deref().unwrap_or(""),
            self.message_prefix,
        ))
    }

    /// Whether moving from `previous` to `self` deserves a notification.
    ///
    /// Meaningful when the revision changed, when readiness flipped to failed,
    /// or when readiness recovered from failed together with a revision change.
    /// A transient unknown readiness never qualifies on its own.
    pub fn is_meaningful_change_from(&self, previous: &SemanticState) -> bool {
        let revision_changed = self.revision != previous.revision;
        let flipped_to_failed = self.readiness == ReadinessStatus::Failed
            && previous.readiness != ReadinessStatus::Failed;
        let recovered_with_revision = previous.readiness == ReadinessStatus::Failed
            && self.readiness == ReadinessStatus::Ready
            && revision_changed;

        revision_changed || flipped_to_failed || recovered_with_revision
    }
}
