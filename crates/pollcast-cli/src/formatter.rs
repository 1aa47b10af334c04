//! Output formatters for notifications.

use std::collections::BTreeMap;

use clap::ValueEnum;
use comfy_table::{Cell, Table};

use pollcast_client::ClientNotification;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a list of notifications.
pub fn format_notifications(
    notifications: &[ClientNotification],
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(notifications)?),
        OutputFormat::Table => {
            if notifications.is_empty() {
                return Ok("No notifications".to_string());
            }

            let mut table = Table::new();
            table.set_header(vec!["", "Time", "Tenant", "Severity", "Title", "Message", "Id"]);
            for n in notifications {
                table.add_row(vec![
                    Cell::new(if n.read { " " } else { "*" }),
                    Cell::new(n.timestamp.format("%Y-%m-%d %H:%M:%S")),
                    Cell::new(&n.tenant_id),
                    Cell::new(n.severity),
                    Cell::new(&n.title),
                    Cell::new(truncate(&n.message, 60)),
                    Cell::new(n.id),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render one notification as it arrives.
pub fn format_notification(
    notification: &ClientNotification,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(notification)?),
        OutputFormat::Table => Ok(format!(
            "{} [{}] {}: {}",
            notification.timestamp.format("%H:%M:%S"),
            notification.severity,
            notification.title,
            notification.message
        )),
    }
}

/// Render unread counts per tenant.
pub fn format_counts(counts: &BTreeMap<String, usize>, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(counts)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Tenant", "Unread"]);
            for (tenant, count) in counts {
                table.add_row(vec![Cell::new(tenant), Cell::new(count)]);
            }
            Ok(table.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
