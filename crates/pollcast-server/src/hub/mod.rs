//! Tenant broadcast hub.
//!
//! Reference-counts subscribers per tenant, owns the tenant workers and fans
//! their events out to every subscriber.

mod manager;
mod sink;
mod subscription;

pub use manager::{BroadcastHub, SharedBroadcastHub};
pub use sink::{EventSink, FnSink, SinkError};
pub use subscription::Subscription;
