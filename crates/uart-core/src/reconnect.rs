//! Reconnection policy for the streaming supervisor.
//!
//! By default a lost link ends the stream. Supplying [`ReconnectOptions`] to
//! [`crate::SupervisorOptions`] makes the supervisor locate and connect again
//! after a lost link, waiting between attempts with exponential backoff.

use std::time::Duration;

use crate::error::{Error, Result};

/// Options for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectOptions {
    /// Maximum number of consecutive reconnection attempts (None = unlimited).
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to use exponential backoff.
    pub use_exponential_backoff: bool,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_exponential_backoff: true,
        }
    }
}

impl ReconnectOptions {
    /// Create new reconnect options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of reconnection attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set initial delay before first reconnection attempt.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay between attempts.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier for exponential backoff.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Whether attempt number `attempt` (1-based) is still allowed.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }

    /// Calculate delay for a given attempt number (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.initial_delay;
        }

        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `backoff_multiplier` is >= 1.0
    /// - `initial_delay` is > 0
    /// - `max_delay` >= `initial_delay`
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::invalid_config("initial_delay must be > 0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::invalid_config("max_delay must be >= initial_delay"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_options_default() {
        let opts = ReconnectOptions::default();
        assert_eq!(opts.max_attempts, Some(5));
        assert!(opts.use_exponential_backoff);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_allows_attempt() {
        let opts = ReconnectOptions::new().max_attempts(2);
        assert!(opts.allows_attempt(1));
        assert!(opts.allows_attempt(2));
        assert!(!opts.allows_attempt(3));
        let unlimited = ReconnectOptions {
            max_attempts: None,
            ..Default::default()
        };
        assert!(unlimited.allows_attempt(u32::MAX));
    }

    #[test]
    fn test_delay_calculation() {
        let opts = ReconnectOptions::new()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60));

        assert_eq!(opts.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(opts.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(opts.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let opts = ReconnectOptions::new().max_delay(Duration::from_secs(10));
        assert_eq!(opts.delay_for_attempt(10), Duration::from_secs(10));
        assert_eq!(opts.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_delay() {
        let opts = ReconnectOptions {
            initial_delay: Duration::from_secs(5),
            use_exponential_backoff: false,
            ..Default::default()
        };
        assert_eq!(opts.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(opts.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ReconnectOptions::new().backoff_multiplier(0.5).validate().is_err());
        assert!(ReconnectOptions::new().initial_delay(Duration::ZERO).validate().is_err());
        assert!(
            ReconnectOptions::new()
                .initial_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }
}
