//! Backoff for failed processing cycles.
//!
//! A failed cycle leaves the checkpoint where it was, so retrying simply
//! reprocesses the same capture items. Delays double per consecutive failure
//! and are capped at `max_delay`.

use std::time::Duration;

use chron_config::PipelineConfig;

/// Configuration for retrying failed cycles.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of consecutive failed cycles (including the first).
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Maximum delay between retries (backoff is capped here).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    /// Delay before retrying after `failures` consecutive failures.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    /// Whether `failures` consecutive failures use up the budget.
    #[must_use]
    pub const fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn delays_double_then_cap() {
        let retry = config();
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for(4), Duration::from_millis(500));
        assert_eq!(retry.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn budget_counts_every_failure() {
        let retry = config();
        assert!(!retry.exhausted(3));
        assert!(retry.exhausted(4));
    }

    #[test]
    fn default_follows_pipeline_config() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.base_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }
}
