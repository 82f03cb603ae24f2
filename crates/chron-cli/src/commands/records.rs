use chron_db::repos::{PageCursor, PageRequest, RecordFilter};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::RecordsArgs;
use crate::commands::shared::{parse_enum, parse_time};
use crate::context::AppContext;
use crate::output::output;

/// Handle `chrond records`.
pub async fn handle(
    args: &RecordsArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let filter = RecordFilter {
        change_set_id: args.change_set.clone(),
        entity_id: args.entity.clone(),
        kind: args.kind.as_deref().map(|k| parse_enum(k, "kind")).transpose()?,
        operation: args
            .operation
            .as_deref()
            .map(|op| parse_enum(op, "operation"))
            .transpose()?,
        since: parse_time(args.window.since.as_deref(), "since")?,
        until: parse_time(args.window.until.as_deref(), "until")?,
        references: args.references.clone(),
        reference_attribute: args.reference_attribute.clone(),
    };
    let page = PageRequest {
        size: flags.limit,
        after: args.window.after.clone().map(PageCursor::from),
    };
    let result = ctx.store().change_records(&filter, &page).await?;
    output(&result, flags.format)
}
