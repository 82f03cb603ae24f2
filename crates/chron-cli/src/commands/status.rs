use chron_core::capture::LogPosition;
use chron_db::repos::RecordedGap;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct StatusResponse {
    source: String,
    checkpoint: LogPosition,
    capture_enabled: bool,
    capture_acknowledged: LogPosition,
    gaps: Vec<RecordedGap>,
}

/// Handle `chrond status`.
pub async fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let source = ctx.pipeline.source_name().to_string();
    let response = StatusResponse {
        checkpoint: ctx.store().checkpoint(&source).await?,
        capture_enabled: ctx.source().is_enabled().await?,
        capture_acknowledged: ctx.source().acknowledged().await?,
        gaps: ctx.store().gaps().await?,
        source,
    };
    output(&response, flags.format)
}
