//! End-to-end flow from lister snapshots through the hub to subscribers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pollcast_proto::{ChangeEvent, Condition, EventType, ReadinessStatus, Resource, ResourceList};
use pollcast_server::{BroadcastHub, Error, MemoryLister, ResourceLister, WatchConfig};

const KIND: &str = "Kustomization";

fn kustomization(name: &str, version: u64, revision: &str, ready: ReadinessStatus) -> Resource {
    let mut r = Resource::default();
    r.kind = Some(KIND.into());
    r.metadata.name = name.into();
    r.metadata.namespace = "flux-system".into();
    r.metadata.uid = format!("uid-{}", name);
    r.metadata.generation = Some(1);
    r.metadata.resource_version = Some(version.to_string());
    r.status.observed_generation = Some(1);
    r.status.last_applied_revision = Some(revision.into());
    r.status.conditions = vec![Condition::ready(ready, "ReconciliationSucceeded", "Applied")];
    r
}

fn config() -> WatchConfig {
    WatchConfig::new([KIND, "HelmRelease"])
        .with_poll_interval(Duration::from_secs(5))
        .with_heartbeat_interval(Duration::from_secs(30))
        .with_settling_duration(Duration::from_secs(30))
        .with_lister_timeout(Duration::from_secs(2))
}

fn drain(rx: &mut mpsc::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn types(events: &[ChangeEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

fn resource_types(events: &[ChangeEvent]) -> Vec<EventType> {
    events
        .iter()
        .map(|e| e.event_type)
        .filter(|t| t.is_resource_event())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle_reaches_every_subscriber() {
    let lister = Arc::new(MemoryLister::new());
    lister.set("prod", KIND, vec![kustomization("apps", 1, "main@sha1:aaa", ReadinessStatus::Ready)]);
    lister.set_failing("prod", "HelmRelease", true);

    let hub = BroadcastHub::new(lister.clone(), config());
    let (_first, mut rx1) = hub.subscribe_channel("prod", 64);
    let (_second, mut rx2) = hub.subscribe_channel("prod", 64);

    assert_eq!(types(&drain(&mut rx1)), vec![EventType::Connected]);
    assert_eq!(types(&drain(&mut rx2)), vec![EventType::Connected]);

    // Pre-existing resources settle before being announced.
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(resource_types(&drain(&mut rx1)).is_empty());
    tokio::time::sleep(Duration::from_secs(2)).await;
    let events = drain(&mut rx1);
    assert_eq!(resource_types(&events), vec![EventType::Added]);
    let added = events.iter().find(|e| e.event_type == EventType::Added).unwrap();
    assert_eq!(added.resource_type.as_deref(), Some(KIND));
    assert_eq!(added.resource.as_ref().unwrap().metadata.name, "apps");
    drain(&mut rx2);

    // Version churn without semantic change stays silent.
    lister.set("prod", KIND, vec![kustomization("apps", 2, "main@sha1:aaa", ReadinessStatus::Ready)]);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(resource_types(&drain(&mut rx1)).is_empty());

    // A failure is reported.
    lister.set("prod", KIND, vec![kustomization("apps", 3, "main@sha1:aaa", ReadinessStatus::Failed)]);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(resource_types(&drain(&mut rx1)), vec![EventType::Modified]);

    // A fix on a new revision is reported.
    lister.set("prod", KIND, vec![kustomization("apps", 4, "main@sha1:bbb", ReadinessStatus::Ready)]);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(resource_types(&drain(&mut rx1)), vec![EventType::Modified]);

    // Deletion fires once.
    lister.set("prod", KIND, vec![]);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(resource_types(&drain(&mut rx1)), vec![EventType::Deleted]);

    let second = resource_types(&drain(&mut rx2));
    assert_eq!(
        second,
        vec![EventType::Modified, EventType::Modified, EventType::Deleted]
    );

    let snapshot = hub.metrics().snapshot();
    assert_eq!(snapshot.workers_started, 1);
    assert!(snapshot.lister_failures > 0);
    assert_eq!(snapshot.heartbeat_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_reach_subscribers() {
    let lister = Arc::new(MemoryLister::new());
    let hub = BroadcastHub::new(lister, config());
    let (_sub, mut rx) = hub.subscribe_channel("prod", 64);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let heartbeats = drain(&mut rx)
        .into_iter()
        .filter(|e| e.event_type == EventType::Heartbeat)
        .count();
    assert_eq!(heartbeats, 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_events_after_last_unsubscribe() {
    let lister = Arc::new(MemoryLister::new());
    lister.set("prod", KIND, vec![kustomization("apps", 1, "r1", ReadinessStatus::Ready)]);
    let hub = BroadcastHub::new(lister.clone(), config().with_settling_duration(Duration::ZERO));

    let (sub, mut rx) = hub.subscribe_channel("prod", 64);
    tokio::time::sleep(Duration::from_secs(1)).await;
    drain(&mut rx);

    let calls = lister.calls();
    drop(sub);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(lister.calls(), calls);
    assert_eq!(hub.tenant_count(), 0);
    assert_eq!(hub.metrics().active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_subscriber_does_not_block_others() {
    let lister = Arc::new(MemoryLister::new());
    let hub = BroadcastHub::new(
        lister,
        config().with_heartbeat_interval(Duration::from_secs(1)),
    );

    let (_slow, _slow_rx) = hub.subscribe_channel("prod", 1);
    let (_fast, mut fast_rx) = hub.subscribe_channel("prod", 64);

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    let heartbeats = drain(&mut fast_rx)
        .into_iter()
        .filter(|e| e.event_type == EventType::Heartbeat)
        .count();
    assert_eq!(heartbeats, 5);
    assert!(hub.metrics().snapshot().sink_failures >= 5);
}

/// Lister whose `Broken` kind panics on its first calls and whose `Stuck`
/// kind never answers.
struct UnreliableLister {
    panics_left: AtomicU32,
    items: Vec<Resource>,
}

#[async_trait]
impl ResourceLister for UnreliableLister {
    async fn list(&self, _tenant: &str, kind: &str) -> Result<ResourceList, Error> {
        match kind {
            "Broken" => {
                let left = self.panics_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.panics_left.store(left - 1, Ordering::SeqCst);
                    panic!("malformed listing");
                }
                Ok(ResourceList::new(Vec::new()))
            }
            "Stuck" => futures::future::pending().await,
            _ => Ok(ResourceList::new(self.items.clone())),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_worker_survives_panicking_and_hanging_lister() {
    let lister = Arc::new(UnreliableLister {
        panics_left: AtomicU32::new(2),
        items: vec![kustomization("apps", 1, "r1", ReadinessStatus::Ready)],
    });
    let mut config = config();
    config.kinds = vec!["Broken".into(), "Stuck".into(), KIND.into()];

    let hub = BroadcastHub::new(lister, config);
    let (_sub, mut rx) = hub.subscribe_channel("prod", 64);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let events = drain(&mut rx);

    // Two panicking cycles, then every cycle waits out the stuck kind before
    // listing the healthy one.
    let added: Vec<&ChangeEvent> = events
        .iter()
        .filter(|e| e.event_type == EventType::Added)
        .collect();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].resource_type.as_deref(), Some(KIND));
    assert!(events.iter().any(|e| e.event_type == EventType::Heartbeat));

    let snapshot = hub.metrics().snapshot();
    assert_eq!(snapshot.cycle_panics, 2);
    assert!(snapshot.lister_timeouts >= 6);
    assert!(snapshot.poll_cycles >= 6);
    assert_eq!(snapshot.lister_failures, 0);
    assert!(hub.is_watching("prod"));
}
