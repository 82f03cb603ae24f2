use chron_db::repos::{ChangeSetFilter, PageCursor, PageRequest};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::ChangeSetsArgs;
use crate::commands::shared::parse_time;
use crate::context::AppContext;
use crate::output::output;

/// Handle `chrond change-sets`.
pub async fn handle(
    args: &ChangeSetsArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let filter = ChangeSetFilter {
        since: parse_time(args.window.since.as_deref(), "since")?,
        until: parse_time(args.window.until.as_deref(), "until")?,
    };
    let page = PageRequest {
        size: flags.limit,
        after: args.window.after.clone().map(PageCursor::from),
    };
    let result = ctx.store().change_sets(&filter, &page).await?;
    output(&result, flags.format)
}
