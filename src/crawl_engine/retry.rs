//! Retry policy for transient fetch failures.

use std::time::Duration;

/// How many times to attempt a fetch and how long to wait between attempts.
///
/// The policy is injected into the fetcher so tests can substitute a
/// zero-delay variant.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per URL, including the first.
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `base_delay * n` before retrying.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1200),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt cap and no backoff sleeps.
    #[must_use]
    pub fn without_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before the retry following failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_linearly() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
    }

    #[test]
    fn zero_delay_policy_never_sleeps() {
        let policy = RetryPolicy::without_delay(5);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for_attempt(4), Duration::ZERO);
    }
}
