use chron_core::capture::LogPosition;
use chron_core::source::CaptureAdmin;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::CaptureCommands;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct CaptureResponse {
    action: &'static str,
    capture_enabled: bool,
    capture_acknowledged: LogPosition,
}

/// Handle `chrond capture`. Holds the pipeline lock so no cycle interleaves.
pub async fn handle(
    action: &CaptureCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let _cycle = ctx.pipeline.exclusive().await;
    let source = ctx.source();

    let name = match action {
        CaptureCommands::Enable { storage } => {
            let storage = storage.as_deref().unwrap_or(&ctx.config.capture.path);
            source.enable_capture(storage).await?;
            "enable"
        }
        CaptureCommands::Disable => {
            source.disable_capture().await?;
            "disable"
        }
        CaptureCommands::Replace { table } => {
            source.replace_capture_instance(table).await?;
            "replace"
        }
        CaptureCommands::Purge { through } => {
            source.purge_through(LogPosition::new(*through)).await?;
            "purge"
        }
    };

    let response = CaptureResponse {
        action: name,
        capture_enabled: source.is_enabled().await?,
        capture_acknowledged: source.acknowledged().await?,
    };
    output(&response, flags.format)
}
