//! Client configuration.

use std::time::Duration;

use pollcast_proto::MESSAGE_PREFIX_LEN;

use crate::backoff::ReconnectPolicy;

/// Default server endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default notification log capacity.
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 100;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (e.g., "http://127.0.0.1:8080").
    pub endpoint: String,

    /// Tenant to watch.
    pub tenant_id: String,

    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,

    /// Maximum number of stored notifications.
    pub max_notifications: usize,

    /// Readiness message characters used for deduplication.
    pub message_prefix_len: usize,

    /// Timeout for opening the stream.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration watching `tenant_id` on `endpoint`.
    pub fn new(endpoint: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tenant_id: tenant_id.into(),
            reconnect: ReconnectPolicy::default(),
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
            message_prefix_len: MESSAGE_PREFIX_LEN,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create a configuration for a server on localhost.
    pub fn localhost(tenant_id: impl Into<String>) -> Self {
        Self::new(DEFAULT_ENDPOINT, tenant_id)
    }

    /// Set the delay before the first reconnect.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect.base_delay = delay;
        self
    }

    /// Set the exponent cap of the reconnect delay.
    pub fn with_max_exponent(mut self, exponent: u32) -> Self {
        self.reconnect.max_exponent = exponent;
        self
    }

    /// Set the number of reconnect attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Set the full reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the notification log capacity.
    pub fn with_max_notifications(mut self, max: usize) -> Self {
        self.max_notifications = max;
        self
    }

    /// Set the message prefix length used for deduplication.
    pub fn with_message_prefix_len(mut self, len: usize) -> Self {
        self.message_prefix_len = len;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// URL of the tenant's event stream.
    pub fn watch_url(&self) -> String {
        format!(
            "{}/watch/{}",
            self.endpoint.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::localhost("prod");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.tenant_id, "prod");
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.max_notifications, 100);
        assert_eq!(config.message_prefix_len, 100);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("http://10.0.0.1:9090/", "staging")
            .with_base_delay(Duration::from_millis(250))
            .with_max_exponent(3)
            .with_max_attempts(4)
            .with_max_notifications(10)
            .with_message_prefix_len(20)
            .with_connect_timeout(Duration::from_secs(2));

        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_exponent, 3);
        assert_eq!(config.reconnect.max_attempts, 4);
        assert_eq!(config.max_notifications, 10);
        assert_eq!(config.message_prefix_len, 20);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.watch_url(), "http://10.0.0.1:9090/watch/staging");
    }
}
