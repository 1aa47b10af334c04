//! Watch pipeline metrics.
//!
//! Counters are updated by workers and the hub and exported as Prometheus text
//! by the `/metrics` route.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pollcast_proto::EventType;
use serde::Serialize;

/// Central registry for watch metrics.
pub struct WatchMetrics {
    started_at: Instant,

    // Worker metrics
    workers_started: AtomicU64,
    workers_stopped: AtomicU64,
    poll_cycles: AtomicU64,
    lister_failures: AtomicU64,
    lister_timeouts: AtomicU64,
    cycle_panics: AtomicU64,

    // Event metrics
    added_events: AtomicU64,
    modified_events: AtomicU64,
    deleted_events: AtomicU64,
    heartbeat_events: AtomicU64,

    // Delivery metrics
    deliveries: AtomicU64,
    sink_failures: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub workers_started: u64,
    pub workers_stopped: u64,
    pub poll_cycles: u64,
    pub lister_failures: u64,
    pub lister_timeouts: u64,
    pub cycle_panics: u64,
    pub added_events: u64,
    pub modified_events: u64,
    pub deleted_events: u64,
    pub heartbeat_events: u64,
    pub deliveries: u64,
    pub sink_failures: u64,
}

impl WatchMetrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            workers_started: AtomicU64::new(0),
            workers_stopped: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            lister_failures: AtomicU64::new(0),
            lister_timeouts: AtomicU64::new(0),
            cycle_panics: AtomicU64::new(0),
            added_events: AtomicU64::new(0),
            modified_events: AtomicU64::new(0),
            deleted_events: AtomicU64::new(0),
            heartbeat_events: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    pub fn record_worker_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_stopped(&self) {
        self.workers_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_cycle(&self) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lister_failure(&self) {
        self.lister_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lister_timeout(&self) {
        self.lister_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_panic(&self) {
        self.cycle_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event emitted by a worker.
    pub fn record_event(&self, event_type: EventType) {
        let counter = match event_type {
            EventType::Added => &self.added_events,
            EventType::Modified => &self.modified_events,
            EventType::Deleted => &self.deleted_events,
            EventType::Heartbeat => &self.heartbeat_events,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of workers currently running.
    pub fn active_workers(&self) -> u64 {
        let started = self.workers_started.load(Ordering::Relaxed);
        started.saturating_sub(self.workers_stopped.load(Ordering::Relaxed))
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_stopped: self.workers_stopped.load(Ordering::Relaxed),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            lister_failures: self.lister_failures.load(Ordering::Relaxed),
            lister_timeouts: self.lister_timeouts.load(Ordering::Relaxed),
            cycle_panics: self.cycle_panics.load(Ordering::Relaxed),
            added_events: self.added_events.load(Ordering::Relaxed),
            modified_events: self.modified_events.load(Ordering::Relaxed),
            deleted_events: self.deleted_events.load(Ordering::Relaxed),
            heartbeat_events: self.heartbeat_events.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        let counters: [(&str, &str, u64); 8] = [
            ("pollcast_workers_started_total", "Tenant workers started", s.workers_started),
            ("pollcast_workers_stopped_total", "Tenant workers stopped", s.workers_stopped),
            ("pollcast_poll_cycles_total", "Completed poll cycles", s.poll_cycles),
            ("pollcast_lister_failures_total", "Failed lister calls", s.lister_failures),
            ("pollcast_lister_timeouts_total", "Timed out lister calls", s.lister_timeouts),
            ("pollcast_cycle_panics_total", "Poll cycles aborted by a panic", s.cycle_panics),
            ("pollcast_deliveries_total", "Events delivered to subscribers", s.deliveries),
            ("pollcast_sink_failures_total", "Failed subscriber deliveries", s.sink_failures),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        }

        let _ = writeln!(out, "# HELP pollcast_events_total Events emitted by workers");
        let _ = writeln!(out, "# TYPE pollcast_events_total counter");
        for (label, value) in [
            ("added", s.added_events),
            ("modified", s.modified_events),
            ("deleted", s.deleted_events),
            ("heartbeat", s.heartbeat_events),
        ] {
            let _ = writeln!(out, "pollcast_events_total{{type=\"{}\"}} {}", label, value);
        }

        let _ = writeln!(out, "# HELP pollcast_active_workers Tenant workers running");
        let _ = writeln!(out, "# TYPE pollcast_active_workers gauge");
        let _ = writeln!(out, "pollcast_active_workers {}", self.active_workers());

        out
    }
}

impl Default for WatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle.
pub type SharedWatchMetrics = Arc<WatchMetrics>;

/// Create a new shared metrics registry.
pub fn new_shared_metrics() -> SharedWatchMetrics {
    Arc::new(WatchMetrics::new())
}
