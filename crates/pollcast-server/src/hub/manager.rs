//! Broadcast hub managing tenant workers and their subscribers.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pollcast_proto::ChangeEvent;

use super::sink::EventSink;
use super::subscription::Subscription;
use crate::config::WatchConfig;
use crate::lister::SharedLister;
use crate::metrics::{new_shared_metrics, SharedWatchMetrics};
use crate::watch::{EventEmitter, TenantWatchWorker};

/// A registered subscriber.
struct SubscriberEntry {
    sink: Arc<dyn EventSink>,
    subscribed_at: Instant,
}

/// Subscriber set of one tenant.
struct TenantSubscribers {
    tenant: String,
    sinks: RwLock<HashMap<u64, SubscriberEntry>>,
    metrics: SharedWatchMetrics,
}

impl TenantSubscribers {
    /// Deliver `event` to every current sink. Returns the number of successful deliveries.
    fn broadcast(&self, event: &ChangeEvent) -> usize {
        let sinks: Vec<(u64, Arc<dyn EventSink>)> = self
            .sinks
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.sink.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sink) in sinks {
            if deliver(&self.tenant, id, sink.as_ref(), event, &self.metrics) {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Deliver to one sink, isolating failures and panics.
fn deliver(
    tenant: &str,
    subscriber_id: u64,
    sink: &dyn EventSink,
    event: &ChangeEvent,
    metrics: &SharedWatchMetrics,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| sink.deliver(event))) {
        Ok(Ok(())) => {
            metrics.record_delivery();
            true
        }
        Ok(Err(e)) => {
            metrics.record_sink_failure();
            warn!(tenant, subscriber_id, error = %e, "delivery to subscriber failed");
            false
        }
        Err(_) => {
            metrics.record_sink_failure();
            warn!(tenant, subscriber_id, "subscriber sink panicked during delivery");
            false
        }
    }
}

/// Watch context of a tenant with at least one subscriber.
struct TenantContext {
    subscribers: Arc<TenantSubscribers>,
    worker: TenantWatchWorker,
}

/// Multiplexes one worker per tenant across any number of subscribers.
///
/// A tenant's worker starts with its first subscriber and is stopped, together
/// with its diff history, when the last subscriber leaves.
pub struct BroadcastHub {
    lister: SharedLister,
    config: WatchConfig,
    metrics: SharedWatchMetrics,
    tenants: Mutex<HashMap<String, TenantContext>>,
    next_subscriber_id: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub polling through `lister`.
    pub fn new(lister: SharedLister, config: WatchConfig) -> Arc<Self> {
        Self::with_metrics(lister, config, new_shared_metrics())
    }

    /// Create a hub recording into the given metrics registry.
    pub fn with_metrics(
        lister: SharedLister,
        config: WatchConfig,
        metrics: SharedWatchMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            lister,
            config,
            metrics,
            tenants: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
        })
    }

    /// Subscribe `sink` to `tenant`.
    ///
    /// Starts the tenant's worker if this is its first subscriber. The new sink,
    /// and only it, immediately receives a `Connected` event. Dropping the
    /// returned guard unsubscribes.
    pub fn subscribe(self: &Arc<Self>, tenant: &str, sink: Arc<dyn EventSink>) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);

        let mut tenants = self.tenants.lock();
        let context = tenants
            .entry(tenant.to_string())
            .or_insert_with(|| self.start_tenant(tenant));

        deliver(tenant, id, sink.as_ref(), &ChangeEvent::connected(tenant), &self.metrics);

        let count = {
            let mut sinks = context.subscribers.sinks.write();
            sinks.insert(
                id,
                SubscriberEntry {
                    sink,
                    subscribed_at: Instant::now(),
                },
            );
            sinks.len()
        };

        debug!(tenant, subscriber_id = id, subscribers = count, "subscriber added");

        Subscription::new(Arc::downgrade(self), tenant, id)
    }

    /// Subscribe with a bounded channel as the sink.
    pub fn subscribe_channel(
        self: &Arc<Self>,
        tenant: &str,
        buffer: usize,
    ) -> (Subscription, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let subscription = self.subscribe(tenant, Arc::new(tx));
        (subscription, rx)
    }

    fn start_tenant(&self, tenant: &str) -> TenantContext {
        let subscribers = Arc::new(TenantSubscribers {
            tenant: tenant.to_string(),
            sinks: RwLock::new(HashMap::new()),
            metrics: self.metrics.clone(),
        });

        let weak: Weak<TenantSubscribers> = Arc::downgrade(&subscribers);
        let emit: EventEmitter = Arc::new(move |event: ChangeEvent| {
            if let Some(subscribers) = weak.upgrade() {
                subscribers.broadcast(&event);
            }
        });

        let worker = TenantWatchWorker::start(
            tenant,
            self.config.clone(),
            self.lister.clone(),
            emit,
            self.metrics.clone(),
        );

        TenantContext {
            subscribers,
            worker,
        }
    }

    /// Remove a subscriber. Returns false if it was not registered.
    ///
    /// Removing the last subscriber stops the tenant's worker and discards its
    /// diff state before returning.
    pub fn unsubscribe(&self, tenant: &str, subscriber_id: u64) -> bool {
        let mut tenants = self.tenants.lock();

        let Some(context) = tenants.get(tenant) else {
            return false;
        };

        let (entry, remaining) = {
            let mut sinks = context.subscribers.sinks.write();
            let entry = sinks.remove(&subscriber_id);
            (entry, sinks.len())
        };

        let Some(entry) = entry else {
            return false;
        };

        debug!(
            tenant,
            subscriber_id,
            subscribers = remaining,
            connected_ms = entry.subscribed_at.elapsed().as_millis() as u64,
            "subscriber removed"
        );

        if remaining == 0 {
            if let Some(context) = tenants.remove(tenant) {
                context.worker.stop();
                info!(tenant, "last subscriber left; tenant context discarded");
            }
        }

        true
    }

    /// Deliver `event` to every subscriber of `tenant`.
    ///
    /// Returns the number of successful deliveries; failing sinks are skipped.
    pub fn broadcast(&self, tenant: &str, event: &ChangeEvent) -> usize {
        let subscribers = {
            let tenants = self.tenants.lock();
            match tenants.get(tenant) {
                Some(context) => context.subscribers.clone(),
                None => return 0,
            }
        };
        subscribers.broadcast(event)
    }

    /// Number of tenants with a running worker.
    pub fn tenant_count(&self) -> usize {
        self.tenants.lock().len()
    }

    /// Tenants with a running worker.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.tenants.lock().keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Number of subscribers of `tenant`.
    pub fn subscriber_count(&self, tenant: &str) -> usize {
        self.tenants
            .lock()
            .get(tenant)
            .map(|c| c.subscribers.sinks.read().len())
            .unwrap_or(0)
    }

    /// Total subscribers across all tenants.
    pub fn total_subscribers(&self) -> usize {
        self.tenants
            .lock()
            .values()
            .map(|c| c.subscribers.sinks.read().len())
            .sum()
    }

    /// Whether `tenant` currently has a running worker.
    pub fn is_watching(&self, tenant: &str) -> bool {
        self.tenants
            .lock()
            .get(tenant)
            .map(|c| c.worker.is_running())
            .unwrap_or(false)
    }

    /// Metrics registry used by this hub.
    pub fn metrics(&self) -> &SharedWatchMetrics {
        &self.metrics
    }

    /// Watch settings applied to new workers.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Stop every worker and drop all subscribers.
    pub fn shutdown(&self) {
        let contexts: Vec<(String, TenantContext)> = self.tenants.lock().drain().collect();
        for (tenant, context) in &contexts {
            context.worker.stop();
            debug!(tenant = %tenant, "tenant stopped on shutdown");
        }
        if !contexts.is_empty() {
            info!(tenants = contexts.len(), "broadcast hub shut down");
        }
    }
}

impl Drop for BroadcastHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared hub handle.
pub type SharedBroadcastHub = Arc<BroadcastHub>;
