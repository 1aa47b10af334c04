//! Client delivery consumer.
//!
//! Keeps one event stream open, reconnects with backoff when it fails and
//! feeds accepted events into the notification store.
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                     ^             |
//!                     |   backoff   v
//!                     +--------- Error --(attempts exhausted)--> Error (terminal)
//! ```
//!
//! Exactly one driver task exists while the consumer is active, so connect
//! attempts are strictly sequential.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use pollcast_proto::{ChangeEvent, EventType};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::notification::ClientNotification;
use crate::store::NotificationStore;
use crate::transport::{EventStream, EventTransport};

/// Capacity of the accepted-notification broadcast channel.
const ACCEPTED_CHANNEL_CAPACITY: usize = 64;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and not trying to.
    Disconnected,
    /// Opening the stream.
    Connecting,
    /// Stream open.
    Connected,
    /// Stream failed; a reconnect is pending unless `gave_up` is set.
    Error,
}

/// Connection bookkeeping published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the stream was last open.
    pub attempt: u32,
    pub last_error: Option<String>,
    /// When the last event of any type arrived.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Reconnecting stopped after the maximum number of attempts.
    pub gave_up: bool,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            last_error: None,
            last_event_at: None,
            gave_up: false,
        }
    }
}

struct ConsumerShared {
    config: ClientConfig,
    transport: Arc<dyn EventTransport>,
    store: Arc<NotificationStore>,
    status: watch::Sender<ConnectionStatus>,
    accepted: broadcast::Sender<ClientNotification>,
}

struct Driver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Maintains the event stream of one tenant.
pub struct DeliveryConsumer {
    shared: Arc<ConsumerShared>,
    driver: Mutex<Option<Driver>>,
}

impl DeliveryConsumer {
    /// Create a disconnected consumer.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn EventTransport>,
        store: Arc<NotificationStore>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (accepted, _) = broadcast::channel(ACCEPTED_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(ConsumerShared {
                config,
                transport,
                store,
                status,
                accepted,
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start connecting. No-op while a connection is open or being retried.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|d| !d.task.is_finished()) {
            debug!(tenant = %self.shared.config.tenant_id, "consumer already active");
            return;
        }

        self.shared.update_status(|s| {
            s.state = ConnectionState::Connecting;
            s.attempt = 0;
            s.gave_up = false;
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(self.shared.clone(), cancel.clone()));
        *driver = Some(Driver { cancel, task });
    }

    /// Close the stream and cancel any pending reconnect.
    ///
    /// The driver task has exited when this returns; nothing is ingested
    /// afterwards until [`connect`](Self::connect) is called again. A
    /// `connect` racing with this call wins: its driver keeps running and the
    /// published status is left to it.
    pub async fn disconnect(&self) {
        let previous = self.driver.lock().take();
        if let Some(driver) = previous {
            driver.cancel.cancel();
            driver.task.abort();
            let _ = driver.task.await;
        }

        let driver = self.driver.lock();
        if driver.is_some() {
            debug!(tenant = %self.shared.config.tenant_id, "consumer reconnected during disconnect");
            return;
        }
        self.shared.update_status(|s| {
            s.state = ConnectionState::Disconnected;
            s.attempt = 0;
            s.gave_up = false;
        });
        drop(driver);
        info!(tenant = %self.shared.config.tenant_id, "consumer disconnected");
    }

    /// Whether a driver task is running.
    pub fn is_active(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .is_some_and(|d| !d.task.is_finished())
    }

    /// Wait until the stream is open.
    ///
    /// Fails with [`Error::Stopped`] if the consumer is not active or gives up
    /// before a connection succeeds.
    pub async fn wait_connected(&self) -> Result<(), Error> {
        let mut rx = self.shared.status.subscribe();
        loop {
            {
                let status = rx.borrow_and_update();
                match status.state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Error if status.gave_up => return Err(Error::Stopped),
                    ConnectionState::Disconnected if !self.is_active() => {
                        return Err(Error::Stopped)
                    }
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err(Error::Stopped);
            }
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Watch connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Receive every notification accepted into the store.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<ClientNotification> {
        self.shared.accepted.subscribe()
    }

    /// The notification store fed by this consumer.
    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.shared.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl Drop for DeliveryConsumer {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.cancel.cancel();
            driver.task.abort();
        }
    }
}

impl ConsumerShared {
    fn update_status(&self, update: impl FnOnce(&mut ConnectionStatus)) {
        self.status.send_modify(update);
    }

    /// Read events until the stream fails. Returns `None` when cancelled.
    async fn consume(&self, mut stream: EventStream, cancel: &CancellationToken) -> Option<Error> {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return None,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => self.handle_event(event),
                Some(Err(Error::Protocol(e))) => {
                    warn!(tenant = %self.config.tenant_id, error = %e, "skipping undecodable event");
                }
                Some(Err(e)) => return Some(e),
                None => return Some(Error::Transport("stream closed by server".into())),
            }
        }
    }

    fn handle_event(&self, mut event: ChangeEvent) {
        self.update_status(|s| s.last_event_at = Some(Utc::now()));

        match event.event_type {
            EventType::Connected | EventType::Heartbeat => {
                trace!(tenant = %self.config.tenant_id, event_type = event.event_type.as_str(), "bookkeeping event");
            }
            EventType::Unknown => {
                debug!(tenant = %self.config.tenant_id, "ignoring event of unknown type");
            }
            EventType::Added | EventType::Modified | EventType::Deleted | EventType::Error => {
                if event.tenant_id.is_none() {
                    event.tenant_id = Some(self.config.tenant_id.clone());
                }
                if let Some(notification) = self.store.ingest(&event) {
                    debug!(
                        tenant = %notification.tenant_id,
                        title = %notification.title,
                        "notification accepted"
                    );
                    let _ = self.accepted.send(notification);
                }
            }
        }
    }
}

async fn drive(shared: Arc<ConsumerShared>, cancel: CancellationToken) {
    let policy = shared.config.reconnect;
    let tenant = shared.config.tenant_id.clone();
    let mut attempt: u32 = 0;

    loop {
        shared.update_status(|s| {
            s.state = ConnectionState::Connecting;
            s.attempt = attempt;
            s.gave_up = false;
        });

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = shared.transport.open(&tenant) => opened,
        };

        let failure = match opened {
            Ok(stream) => {
                attempt = 0;
                shared.update_status(|s| {
                    s.state = ConnectionState::Connected;
                    s.attempt = 0;
                    s.last_error = None;
                });
                info!(tenant = %tenant, "event stream connected");

                match shared.consume(stream, &cancel).await {
                    Some(e) => e,
                    None => return,
                }
            }
            Err(e) => e,
        };

        let message = failure.to_string();

        if !policy.should_retry(attempt) {
            shared.update_status(|s| {
                s.state = ConnectionState::Error;
                s.attempt = attempt;
                s.last_error = Some(message);
                s.gave_up = true;
            });
            error!(tenant = %tenant, attempt, error = %failure, "giving up on event stream");
            return;
        }

        let delay = policy.delay(attempt);
        attempt += 1;
        shared.update_status(|s| {
            s.state = ConnectionState::Error;
            s.attempt = attempt;
            s.last_error = Some(message);
        });
        warn!(
            tenant = %tenant,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "event stream failed; reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
