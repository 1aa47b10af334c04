//! pollcast protocol types.
//!
//! This crate defines the types shared by the pollcast server and client:
//!
//! - [`resource`] - Listed resources, their keys and minimal projections
//! - [`signature`] - Core and semantic state signatures used for diffing and dedup
//! - [`event`] - Change events exchanged over the push transport
//! - [`error`] - Protocol error types

pub mod error;
pub mod event;
pub mod resource;
pub mod signature;

pub use error::Error;

pub use event::{ChangeEvent, EventType};
pub use resource::{
    Condition, ReadinessStatus, Resource, ResourceKey, ResourceList, ResourceProjection,
};
pub use signature::{CoreStateSignature, SemanticState, SemanticStateSignature, MESSAGE_PREFIX_LEN};
