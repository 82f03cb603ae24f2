//! # chron-config
//!
//! Layered configuration loading for Chronicle using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`CHRONICLE_*` prefix, `__` as separator)
//! 2. Project-level `.chronicle/config.toml`
//! 3. User-level `~/.config/chronicle/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `CHRONICLE_STORE__PATH` -> `store.path`,
//! `CHRONICLE_PIPELINE__POLL_INTERVAL_SECS` -> `pipeline.poll_interval_secs`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use chron_config::ChronConfig;
//!
//! let config = ChronConfig::load_with_dotenv().expect("config");
//! println!("history store: {}", config.store.path);
//! ```

mod capture;
mod error;
mod pipeline;
mod query;
mod store;

pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use pipeline::PipelineConfig;
pub use query::QueryConfig;
pub use store::StoreConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChronConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl ChronConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need
    /// `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is invalid.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Load with an explicit config file layered above the project file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is invalid.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let figment = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHRONICLE_").split("__"));
        Self::from_figment(figment)
    }

    /// Build the figment provider chain.
    ///
    /// This is public so tests can inspect the figment directly or add
    /// additional providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".chronicle/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("CHRONICLE_").split("__"))
    }

    /// Extract and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is invalid.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.capture.validate()?;
        self.pipeline.validate()?;
        self.query.validate()
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chronicle").join("config.toml"))
    }
}
