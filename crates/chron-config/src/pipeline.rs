//! Pipeline scheduling, completion, and retry configuration.

use std::time::Duration;

use chron_core::enums::CompletionMode;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default interval between processing cycles, in seconds.
const fn default_poll_interval_secs() -> u64 {
    10
}

const fn default_cycle_timeout_secs() -> u64 {
    60
}

const fn default_quiescence_secs() -> u64 {
    10
}

const fn default_max_attempts() -> u32 {
    4
}

const fn default_retry_base_delay_ms() -> u64 {
    500
}

const fn default_retry_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Seconds between processing cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// A cycle running longer than this is aborted and retried.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// How transaction completeness is decided.
    #[serde(default)]
    pub completion: CompletionMode,

    /// Quiescence window for `completion = "quiescence"`.
    #[serde(default = "default_quiescence_secs")]
    pub quiescence_secs: u64,

    /// Consecutive failed cycles tolerated before the worker gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Validate raw row images against their JSON Schema before recording.
    #[serde(default)]
    pub strict_validation: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            completion: CompletionMode::default(),
            quiescence_secs: default_quiescence_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            strict_validation: false,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub const fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    #[must_use]
    pub const fn quiescence(&self) -> Duration {
        Duration::from_secs(self.quiescence_secs)
    }

    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub const fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid("pipeline.poll_interval_secs", "must be at least 1"));
        }
        if self.cycle_timeout_secs == 0 {
            return Err(ConfigError::invalid("pipeline.cycle_timeout_secs", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("pipeline.max_attempts", "must be at least 1"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::invalid(
                "pipeline.retry_max_delay_ms",
                "must not be smaller than pipeline.retry_base_delay_ms",
            ));
        }
        Ok(())
    }
}
