use std::path::Path;

use anyhow::Context;
use chron_config::ChronConfig;

use crate::cli::GlobalFlags;

/// Load `.env`, then the layered config, then make sure the database
/// directories exist.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<ChronConfig> {
    let _ = dotenvy::dotenv();

    let config = match &flags.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file '{}' does not exist", path.display());
            }
            ChronConfig::load_from(path)
        }
        None => ChronConfig::load(),
    }
    .context("failed to load chronicle configuration")?;

    ensure_parent_dir(&config.store.path)?;
    ensure_parent_dir(&config.capture.path)?;
    Ok(config)
}

fn ensure_parent_dir(db_path: &str) -> anyhow::Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }
    match Path::new(db_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}
