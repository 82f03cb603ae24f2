//! Query API configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const fn default_page_size() -> u32 {
    100
}

const fn default_max_page_size() -> u32 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Page size used when a request does not specify one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Upper bound applied to every requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl QueryConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::invalid("query.default_page_size", "must be at least 1"));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::invalid(
                "query.max_page_size",
                "must not be smaller than query.default_page_size",
            ));
        }
        Ok(())
    }
}
