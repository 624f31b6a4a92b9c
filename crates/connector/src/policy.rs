use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Bounded exponential backoff between reconnect attempts.
///
/// The attempt counter restarts after every successful open. Once
/// `max_attempts` consecutive attempts have failed the connection gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Whether the 1-based `attempt` may still be made.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before the 1-based `attempt`, doubling up to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(6), Duration::from_secs(10));
        assert_eq!(policy.delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_allows() {
        let policy = ReconnectPolicy::new(2, Duration::from_millis(10), Duration::from_millis(40));
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert!(!ReconnectPolicy::disabled().allows(1));
    }
}
