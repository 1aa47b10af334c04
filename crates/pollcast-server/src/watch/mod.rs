//! Polling watch emulation.
//!
//! Periodic full listings are diffed into semantic Added/Modified/Deleted events
//! by one worker per tenant.

mod state;
mod worker;

pub use state::{Change, DiffState};
pub use worker::{EventEmitter, TenantWatchWorker};
