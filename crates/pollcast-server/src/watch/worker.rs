//! Tenant watch worker.
//!
//! One worker owns the polling loop, diff state and heartbeat timer of one tenant.
//! The poll loop reschedules itself only while the worker is marked running; the
//! check happens after a cycle completes, so a stop requested mid-cycle lets the
//! in-flight cycle finish. Events produced after a stop are discarded.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pollcast_proto::ChangeEvent;

use super::state::{Change, DiffState};
use crate::config::WatchConfig;
use crate::error::Error;
use crate::lister::SharedLister;
use crate::metrics::SharedWatchMetrics;

/// Shortest heartbeat period a worker will schedule.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Callback receiving every event a worker produces.
pub type EventEmitter = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Handle to a running tenant worker.
pub struct TenantWatchWorker {
    tenant: String,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    poll_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
    metrics: SharedWatchMetrics,
}

impl TenantWatchWorker {
    /// Start polling `tenant` and emitting heartbeats.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        tenant: impl Into<String>,
        config: WatchConfig,
        lister: SharedLister,
        emit: EventEmitter,
        metrics: SharedWatchMetrics,
    ) -> Self {
        let tenant = tenant.into();
        let running = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let poll_loop = PollLoop {
            tenant: tenant.clone(),
            state: DiffState::new(config.settling_duration),
            config: config.clone(),
            lister,
            emit: emit.clone(),
            running: running.clone(),
            cancel: cancel.clone(),
            metrics: metrics.clone(),
        };
        let poll_task = tokio::spawn(poll_loop.run());

        let heartbeat_task = tokio::spawn(run_heartbeat(
            tenant.clone(),
            config,
            emit,
            running.clone(),
            metrics.clone(),
        ));

        metrics.record_worker_started();
        info!(tenant = %tenant, "tenant watch worker started");

        Self {
            tenant,
            running,
            cancel,
            poll_task,
            heartbeat_task,
            metrics,
        }
    }

    /// Stop the worker.
    ///
    /// Cancels the pending poll delay and the heartbeat timer before returning.
    /// An in-flight poll cycle runs to completion but its events are dropped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.heartbeat_task.abort();
        self.metrics.record_worker_stopped();
        info!(tenant = %self.tenant, "tenant watch worker stopped");
    }

    /// Whether the worker is still marked running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Tenant served by this worker.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Whether the poll task has exited.
    pub fn is_finished(&self) -> bool {
        self.poll_task.is_finished()
    }
}

impl Drop for TenantWatchWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TenantWatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantWatchWorker")
            .field("tenant", &self.tenant)
            .field("running", &self.is_running())
            .finish()
    }
}

struct PollLoop {
    tenant: String,
    state: DiffState,
    config: WatchConfig,
    lister: SharedLister,
    emit: EventEmitter,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    metrics: SharedWatchMetrics,
}

impl PollLoop {
    async fn run(mut self) {
        loop {
            let cycle = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
            if cycle.is_err() {
                self.metrics.record_cycle_panic();
                error!(tenant = %self.tenant, "poll cycle panicked; rescheduling");
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        debug!(tenant = %self.tenant, "poll loop exited");
    }

    async fn run_cycle(&mut self) {
        for kind in self.config.kinds.clone() {
            let listing = tokio::time::timeout(
                self.config.lister_timeout,
                self.lister.list(&self.tenant, &kind),
            )
            .await
            .unwrap_or_else(|_| Err(Error::timeout(&self.tenant, &kind)));

            let list = match listing {
                Ok(list) => list,
                Err(e) => {
                    if matches!(e, Error::Timeout { .. }) {
                        self.metrics.record_lister_timeout();
                    } else {
                        self.metrics.record_lister_failure();
                    }
                    warn!(tenant = %self.tenant, kind = %kind, error = %e, "lister call failed");
                    continue;
                }
            };

            let changes = self.state.apply(&kind, &list.items, Instant::now());
            for change in changes {
                let event = match change {
                    Change::Added(r) => ChangeEvent::added(&self.tenant, &kind, r),
                    Change::Modified(r) => ChangeEvent::modified(&self.tenant, &kind, r),
                    Change::Deleted(r) => ChangeEvent::deleted(&self.tenant, &kind, r),
                };
                self.publish(event);
            }
        }

        self.metrics.record_poll_cycle();
    }

    fn publish(&self, event: ChangeEvent) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        debug!(
            tenant = %self.tenant,
            event_type = event.event_type.as_str(),
            resource = ?event.resource_key(),
            "emitting change"
        );
        self.metrics.record_event(event.event_type);
        (self.emit)(event);
    }
}

async fn run_heartbeat(
    tenant: String,
    config: WatchConfig,
    emit: EventEmitter,
    running: Arc<AtomicBool>,
    metrics: SharedWatchMetrics,
) {
    let period = config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
    if period != config.heartbeat_interval {
        warn!(
            tenant = %tenant,
            requested_ms = config.heartbeat_interval.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "heartbeat interval below minimum; clamped"
        );
    }
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        metrics.record_event(pollcast_proto::EventType::Heartbeat);
        emit(ChangeEvent::heartbeat(&tenant));
    }
}
