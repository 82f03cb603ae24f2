use std::sync::Arc;

use anyhow::Context;
use chron_config::ChronConfig;
use chron_db::capture::LibsqlCaptureSource;
use chron_db::store::ChangeStore;
use chron_pipeline::Pipeline;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub config: ChronConfig,
    pub pipeline: Arc<Pipeline<LibsqlCaptureSource>>,
}

impl AppContext {
    /// Open the capture log and the history store named by `config`.
    pub async fn init(config: ChronConfig) -> anyhow::Result<Self> {
        let source = LibsqlCaptureSource::open_local(&config.capture.path)
            .await
            .with_context(|| format!("failed to open capture log at {}", config.capture.path))?;
        let store = ChangeStore::open_local(&config.store.path, config.query.clone())
            .await
            .with_context(|| format!("failed to open history store at {}", config.store.path))?;

        let pipeline = Arc::new(Pipeline::new(source, store, &config));
        Ok(Self { config, pipeline })
    }

    pub fn store(&self) -> &ChangeStore {
        self.pipeline.store()
    }

    pub fn source(&self) -> &LibsqlCaptureSource {
        self.pipeline.source()
    }
}
