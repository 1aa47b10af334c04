//! Server configuration.

use clap::Parser;
use std::time::Duration;

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Default base URL of the upstream resource API.
pub const DEFAULT_LISTER_URL: &str = "http://127.0.0.1:8001";

/// Default resource kinds watched per tenant.
pub const DEFAULT_KINDS: &[&str] = &[
    "Kustomization",
    "HelmRelease",
    "GitRepository",
    "HelmRepository",
    "OCIRepository",
];

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default settling period in milliseconds.
pub const DEFAULT_SETTLING_MS: u64 = 30_000;

/// Default per-call lister timeout in milliseconds.
pub const DEFAULT_LISTER_TIMEOUT_MS: u64 = 10_000;

/// Default per-subscriber event buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Settings shared by every tenant watch worker.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Resource kinds polled on every cycle, in order.
    pub kinds: Vec<String>,

    /// Delay between the end of one poll cycle and the start of the next.
    pub poll_interval: Duration,

    /// Interval between heartbeat events.
    pub heartbeat_interval: Duration,

    /// Minimum observation time before a new resource is reported as added.
    pub settling_duration: Duration,

    /// Upper bound for a single lister call.
    pub lister_timeout: Duration,
}

impl WatchConfig {
    /// Create a watch configuration for the given kinds with default timings.
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            settling_duration: Duration::from_millis(DEFAULT_SETTLING_MS),
            lister_timeout: Duration::from_millis(DEFAULT_LISTER_TIMEOUT_MS),
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the settling duration.
    pub fn with_settling_duration(mut self, duration: Duration) -> Self {
        self.settling_duration = duration;
        self
    }

    /// Set the lister timeout.
    pub fn with_lister_timeout(mut self, timeout: Duration) -> Self {
        self.lister_timeout = timeout;
        self
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_KINDS.iter().copied())
    }
}

/// pollcast server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,

    /// Base URL of the upstream resource API.
    pub lister_url: String,

    /// Worker settings.
    pub watch: WatchConfig,

    /// Events buffered per subscriber before deliveries to it are dropped.
    pub subscriber_buffer: usize,
}

impl ServerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDRESS.to_string(),
            lister_url: DEFAULT_LISTER_URL.to_string(),
            watch: WatchConfig::default(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    /// Set the listen address.
    pub fn with_listen_addr(mut self, address: impl Into<String>) -> Self {
        self.listen_addr = address.into();
        self
    }

    /// Set the upstream API base URL.
    pub fn with_lister_url(mut self, url: impl Into<String>) -> Self {
        self.lister_url = url.into();
        self
    }

    /// Set the worker settings.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    /// Set the per-subscriber buffer.
    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer.max(1);
        self
    }

    /// Check the configuration for values the server cannot run with.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.watch.kinds.is_empty() {
            return Err(crate::Error::Config("at least one kind must be watched".into()));
        }
        if self.watch.poll_interval.is_zero() {
            return Err(crate::Error::Config("poll interval must be positive".into()));
        }
        if self.watch.heartbeat_interval.is_zero() {
            return Err(crate::Error::Config("heartbeat interval must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "pollcast-server")]
#[command(version, about = "Watch stream over a polling-only resource API", long_about = None)]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen: String,

    /// Base URL of the upstream resource API.
    #[arg(long, default_value = DEFAULT_LISTER_URL)]
    pub lister_url: String,

    /// Comma-separated resource kinds to watch.
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_KINDS.iter().map(|k| k.to_string()).collect::<Vec<_>>())]
    pub kinds: Vec<String>,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Heartbeat interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_INTERVAL_MS)]
    pub heartbeat_interval_ms: u64,

    /// Settling period for newly observed resources in milliseconds.
    #[arg(long, default_value_t = DEFAULT_SETTLING_MS)]
    pub settling_ms: u64,

    /// Timeout for a single lister call in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LISTER_TIMEOUT_MS)]
    pub lister_timeout_ms: u64,

    /// Events buffered per subscriber.
    #[arg(long, default_value_t = DEFAULT_SUBSCRIBER_BUFFER)]
    pub subscriber_buffer: usize,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        let watch = WatchConfig::new(self.kinds.into_iter().filter(|k| !k.trim().is_empty()))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms))
            .with_settling_duration(Duration::from_millis(self.settling_ms))
            .with_lister_timeout(Duration::from_millis(self.lister_timeout_ms));

        ServerConfig::new()
            .with_listen_addr(self.listen)
            .with_lister_url(self.lister_url)
            .with_watch(watch)
            .with_subscriber_buffer(self.subscriber_buffer)
    }
}
