//! Reconnect backoff.
//!
//! The delay before reconnect attempt `n` (0-indexed) is
//! `base_delay × 2^min(n, max_exponent)`. The exponent cap bounds the delay;
//! `max_attempts` bounds how many reconnects are tried before giving up.

use std::time::Duration;

/// Default delay before the first reconnect.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default exponent cap (1s × 2^5 = 32s).
pub const DEFAULT_MAX_EXPONENT: u32 = 5;

/// Default number of reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Largest exponent applied to the base delay.
    pub max_exponent: u32,
    /// Reconnects tried before the consumer gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_exponent: DEFAULT_MAX_EXPONENT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.max_exponent).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX)
    }

    /// Largest delay this policy produces.
    pub fn max_delay(&self) -> Duration {
        self.delay(self.max_exponent)
    }

    /// Whether reconnect attempt `attempt` may still be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(16));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
        assert_eq!(policy.delay(9), Duration::from_secs(32));
        assert_eq!(policy.max_delay(), Duration::from_secs(32));
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<Duration> = (0..policy.max_attempts).map(|a| policy.delay(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay()));
    }

    #[test]
    fn test_retry_stops_at_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(100));
    }

    #[test]
    fn test_huge_exponent_saturates() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(u64::MAX / 2),
            max_exponent: 40,
            max_attempts: 50,
        };
        assert_eq!(policy.delay(40), Duration::MAX);
    }
}
