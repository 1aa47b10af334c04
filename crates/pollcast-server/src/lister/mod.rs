//! Resource listers.
//!
//! A lister returns the full current set of one resource kind for one tenant.
//! Absence of an object from a listing means it was deleted; there are no deltas.

mod http;
mod memory;

pub use http::HttpLister;
pub use memory::MemoryLister;

use std::sync::Arc;

use async_trait::async_trait;

use pollcast_proto::ResourceList;

use crate::error::Error;

/// Source of full resource snapshots.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// List every object of `kind` in `tenant`.
    async fn list(&self, tenant: &str, kind: &str) -> Result<ResourceList, Error>;
}

/// Shared lister handle.
pub type SharedLister = Arc<dyn ResourceLister>;
