use crate::cli::GlobalFlags;
use crate::cli::root_commands::HistoryArgs;
use crate::context::AppContext;
use crate::output::output;

/// Handle `chrond history <entity-id>`.
pub async fn handle(
    args: &HistoryArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let history = ctx.store().entity_history(&args.entity_id).await?;
    output(&history, flags.format)
}
