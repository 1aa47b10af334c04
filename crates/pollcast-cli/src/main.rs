//! Pollcast command-line client.
//!
//! Tails a tenant's change stream into a local notification log and manages
//! that log.

mod commands;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::TailOptions;

/// Pollcast command-line client
#[derive(Parser, Debug)]
#[command(name = "pollcast")]
#[command(version, about = "Tail change notifications and manage the local notification log")]
pub struct Args {
    /// Directory holding the notification log
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Maximum number of stored notifications
    #[arg(long, global = true, default_value_t = 100)]
    pub max_notifications: usize,

    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a tenant's notifications and store them
    Tail {
        /// Tenant to watch
        #[arg(short, long)]
        tenant: String,

        /// Server base URL
        #[arg(short = 'H', long, default_value = "http://127.0.0.1:8080")]
        endpoint: String,

        /// Reconnect attempts before giving up
        #[arg(long, default_value_t = 10)]
        max_attempts: u32,

        /// Delay before the first reconnect in milliseconds
        #[arg(long, default_value_t = 1000)]
        base_delay_ms: u64,

        /// Connect timeout in seconds
        #[arg(long, default_value_t = 10)]
        connect_timeout: u64,
    },

    /// List stored notifications, newest first
    List {
        /// Only this tenant
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only unread notifications
        #[arg(short, long)]
        unread: bool,
    },

    /// Show unread counts per tenant
    Counts,

    /// Mark a notification read, or all of them when no id is given
    Read {
        /// Notification id
        id: Option<String>,

        /// Restrict marking all to this tenant
        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Mark a notification unread
    Unread {
        /// Notification id
        id: String,
    },

    /// Delete one notification
    Remove {
        /// Notification id
        id: String,
    },

    /// Delete all notifications, or those of one tenant
    Clear {
        /// Only this tenant
        #[arg(short, long)]
        tenant: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollcast=info,pollcast_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let state_dir = args.state_dir.unwrap_or_else(default_state_dir);
    let store = commands::open_store(&state_dir, args.max_notifications)?;
    let format = args.format;

    match args.command {
        Command::Tail {
            tenant,
            endpoint,
            max_attempts,
            base_delay_ms,
            connect_timeout,
        } => {
            let options = TailOptions {
                endpoint,
                tenant,
                max_attempts,
                base_delay_ms,
                connect_timeout_secs: connect_timeout,
            };
            commands::tail(store, options, format).await
        }
        Command::List { tenant, unread } => {
            commands::list(&store, tenant.as_deref(), unread, format)
        }
        Command::Counts => commands::counts(&store, format),
        Command::Read { id, tenant } => commands::read(&store, id.as_deref(), tenant.as_deref()),
        Command::Unread { id } => commands::unread(&store, &id),
        Command::Remove { id } => commands::remove(&store, &id),
        Command::Clear { tenant } => commands::clear(&store, tenant.as_deref()),
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("pollcast"))
        .unwrap_or_else(|| PathBuf::from(".pollcast"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tail() {
        let args = Args::parse_from(["pollcast", "tail", "--tenant", "prod", "--max-attempts", "3"]);
        match args.command {
            Command::Tail {
                tenant,
                endpoint,
                max_attempts,
                ..
            } => {
                assert_eq!(tenant, "prod");
                assert_eq!(endpoint, "http://127.0.0.1:8080");
                assert_eq!(max_attempts, 3);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.format, OutputFormat::Table);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args = Args::parse_from(["pollcast", "list", "--unread", "--format", "json"]);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(matches!(args.command, Command::List { unread: true, tenant: None }));
    }
}
