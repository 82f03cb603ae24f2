//! Capture source configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_capture_path() -> String {
    ".chronicle/capture.db".to_string()
}

fn default_source_name() -> String {
    "default".to_string()
}

/// Default number of capture items pulled per page.
const fn default_page_size() -> u32 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Storage path of the capture log database.
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// Name under which this source's checkpoint is stored.
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Capture items requested per poll.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            path: default_capture_path(),
            source_name: default_source_name(),
            page_size: default_page_size(),
        }
    }
}

impl CaptureConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::invalid("capture.path", "must not be empty"));
        }
        if self.source_name.trim().is_empty() {
            return Err(ConfigError::invalid("capture.source_name", "must not be empty"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::invalid("capture.page_size", "must be at least 1"));
        }
        Ok(())
    }
}
