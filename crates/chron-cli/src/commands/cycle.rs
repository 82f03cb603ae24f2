use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

/// Handle `chrond cycle`.
pub async fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = ctx.pipeline.run_cycle().await?;
    output(&report, flags.format)
}
