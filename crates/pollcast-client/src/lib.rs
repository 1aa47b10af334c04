//! Pollcast client library.
//!
//! Consumes a tenant's change-event stream, survives disconnects with bounded
//! exponential backoff, drops replayed states and keeps a bounded, persisted
//! notification log with read/unread projections.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pollcast_client::{ClientConfig, DeliveryConsumer, NotificationStore, SledStorage, SseTransport};
//!
//! # async fn example() -> Result<(), pollcast_client::Error> {
//! let config = ClientConfig::localhost("prod");
//! let storage = Arc::new(SledStorage::open("/tmp/pollcast")?);
//! let store = Arc::new(NotificationStore::from_config(&config, storage));
//! let transport = Arc::new(SseTransport::new(&config)?);
//!
//! let consumer = DeliveryConsumer::new(config, transport, store.clone());
//! consumer.connect();
//! // ...
//! println!("{} unread", store.unread_count());
//! consumer.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod error;
pub mod notification;
pub mod persistence;
pub mod sse;
pub mod store;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use config::ClientConfig;
pub use consumer::{ConnectionState, ConnectionStatus, DeliveryConsumer};
pub use dedup::{cache_key, DedupCache};
pub use error::Error;
pub use notification::{ClientNotification, Severity};
pub use persistence::{MemoryStorage, PersistedBlobs, SledStorage, StateStorage};
pub use store::NotificationStore;
pub use transport::{decode_events, EventStream, EventTransport, SseTransport};
