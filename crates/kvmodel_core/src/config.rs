//! Database configuration.

use rand::Rng;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// How commits retry when a watched key changes underneath them.
    pub retry: RetryPolicy,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy used by commits.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum number of commit attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }
}

/// Retry behavior on watch conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Retries forever, immediately.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// A single attempt; the first conflict is reported.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Returns true if another attempt may follow attempt number `attempt`
    /// (1-indexed).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Calculates the delay before retrying after attempt number `attempt`
    /// (1-indexed) failed.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // A negative or NaN multiplier must not produce a negative delay.
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 100);
        assert!(config.retry.add_jitter);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .retry(RetryPolicy::no_retry())
            .max_attempts(7);

        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.initial_delay, Duration::ZERO);
    }

    #[test]
    fn retry_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.allows_retry_after(1));
    }

    #[test]
    fn retry_unbounded_never_gives_up() {
        let policy = RetryPolicy::unbounded();
        assert!(policy.allows_retry_after(1_000_000));
        assert_eq!(policy.delay_for_attempt(50), Duration::ZERO);
    }

    #[test]
    fn retry_exponential_backoff() {
        let policy = RetryPolicy::new(10)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_secs(10))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(40));
    }

    #[test]
    fn retry_delay_is_capped() {
        let policy = RetryPolicy::new(100)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(30))
            .with_jitter(false);

        let delay = policy.delay_for_attempt(20);
        assert!((delay.as_secs_f64() - 0.030).abs() < 1e-6);
    }

    #[test]
    fn retry_delay_never_goes_negative() {
        for multiplier in [-1.0, f64::NAN, f64::NEG_INFINITY] {
            let policy = RetryPolicy::new(10)
                .with_initial_delay(Duration::from_millis(10))
                .with_backoff_multiplier(multiplier);
            for attempt in 1..5 {
                assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(63));
            }
        }
    }

    #[test]
    fn retry_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(10)
            .with_initial_delay(Duration::from_millis(8))
            .with_max_delay(Duration::from_secs(1));

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(8));
            assert!(delay <= Duration::from_millis(10));
        }
    }
}
