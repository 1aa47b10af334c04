//! Pollcast server library.
//!
//! Emulates a watch stream over a source that only supports full listings:
//! one polling worker per watched tenant diffs successive listings into
//! semantic change events, and a broadcast hub fans them out to every
//! subscriber of that tenant over server-sent events.

pub mod config;
pub mod error;
pub mod hub;
pub mod lister;
pub mod metrics;
pub mod routes;
pub mod watch;

pub use config::{Args, ServerConfig, WatchConfig};
pub use error::{AppError, Error};
pub use hub::{BroadcastHub, EventSink, SharedBroadcastHub, SinkError, Subscription};
pub use lister::{HttpLister, MemoryLister, ResourceLister, SharedLister};
pub use metrics::{new_shared_metrics, MetricsSnapshot, SharedWatchMetrics, WatchMetrics};
pub use watch::{Change, DiffState, TenantWatchWorker};

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub owning the tenant workers.
    pub hub: SharedBroadcastHub,
    /// Server configuration.
    pub config: ServerConfig,
}

impl AppState {
    /// Create application state around an existing hub.
    pub fn new(hub: SharedBroadcastHub, config: ServerConfig) -> Self {
        Self { hub, config }
    }

    /// Build the hub from `config` and the given lister.
    pub fn with_lister(lister: SharedLister, config: ServerConfig) -> Self {
        let hub = BroadcastHub::new(lister, config.watch.clone());
        Self { hub, config }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::metrics::routes())
        .merge(routes::watch::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
