//! Subcommand handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use pollcast_client::{
    ClientConfig, ConnectionState, DeliveryConsumer, NotificationStore, SledStorage, SseTransport,
};
use pollcast_proto::MESSAGE_PREFIX_LEN;

use crate::formatter::{self, OutputFormat};

/// Options for `tail`.
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub endpoint: String,
    pub tenant: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub connect_timeout_secs: u64,
}

/// Open the persisted notification store.
pub fn open_store(state_dir: &Path, max_notifications: usize) -> anyhow::Result<Arc<NotificationStore>> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("create state directory {}", state_dir.display()))?;
    let storage = SledStorage::open(state_dir)
        .with_context(|| format!("open state at {}", state_dir.display()))?;
    Ok(Arc::new(NotificationStore::open(
        Arc::new(storage),
        max_notifications,
        MESSAGE_PREFIX_LEN,
    )))
}

/// Stream notifications until interrupted or the consumer gives up.
pub async fn tail(
    store: Arc<NotificationStore>,
    options: TailOptions,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = ClientConfig::new(options.endpoint, options.tenant)
        .with_max_attempts(options.max_attempts)
        .with_base_delay(Duration::from_millis(options.base_delay_ms))
        .with_connect_timeout(Duration::from_secs(options.connect_timeout_secs))
        .with_max_notifications(store.max_notifications());

    let transport = Arc::new(SseTransport::new(&config)?);
    let consumer = DeliveryConsumer::new(config.clone(), transport, store);
    let mut accepted = consumer.subscribe_notifications();
    let mut status = consumer.subscribe_status();

    tracing::info!(url = %config.watch_url(), "tailing change stream");
    consumer.connect();

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            received = accepted.recv() => match received {
                Ok(notification) => println!("{}", formatter::format_notification(&notification, format)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind; notifications skipped");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                match current.state {
                    ConnectionState::Connected => tracing::info!("connected"),
                    ConnectionState::Error if current.gave_up => {
                        break Err(anyhow::anyhow!(
                            "giving up after {} attempts: {}",
                            current.attempt,
                            current.last_error.unwrap_or_default()
                        ));
                    }
                    ConnectionState::Error => tracing::warn!(
                        attempt = current.attempt,
                        error = current.last_error.as_deref().unwrap_or(""),
                        "connection lost"
                    ),
                    _ => {}
                }
            }
        }
    };

    consumer.disconnect().await;
    outcome
}

/// Print stored notifications.
pub fn list(
    store: &NotificationStore,
    tenant: Option<&str>,
    unread_only: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut notifications = match tenant {
        Some(tenant) => store.notifications_for(tenant),
        None => store.notifications(),
    };
    if unread_only {
        notifications.retain(|n| !n.read);
    }
    println!("{}", formatter::format_notifications(&notifications, format)?);
    Ok(())
}

/// Print unread counts per tenant.
pub fn counts(store: &NotificationStore, format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", formatter::format_counts(&store.unread_by_tenant(), format)?);
    Ok(())
}

/// Mark one notification, or all of them, read.
pub fn read(store: &NotificationStore, id: Option<&str>, tenant: Option<&str>) -> anyhow::Result<()> {
    match id {
        Some(id) => {
            let id = parse_id(id)?;
            anyhow::ensure!(store.mark_read(id), "no notification {}", id);
            println!("marked {} read", id);
        }
        None => {
            let changed = store.mark_all_read(tenant);
            println!("marked {} notification(s) read", changed);
        }
    }
    Ok(())
}

/// Mark one notification unread.
pub fn unread(store: &NotificationStore, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    anyhow::ensure!(store.mark_unread(id), "no notification {}", id);
    println!("marked {} unread", id);
    Ok(())
}

/// Delete one notification.
pub fn remove(store: &NotificationStore, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    anyhow::ensure!(store.remove(id), "no notification {}", id);
    println!("removed {}", id);
    Ok(())
}

/// Delete all notifications, or those of one tenant.
pub fn clear(store: &NotificationStore, tenant: Option<&str>) -> anyhow::Result<()> {
    let removed = store.clear(tenant);
    println!("removed {} notification(s)", removed);
    Ok(())
}

fn parse_id(id: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("invalid notification id: {}", id))
}
