use clap::{Args, Subcommand};

use crate::cli::subcommands::CaptureCommands;

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Run the worker loop until interrupted.
    Run,
    /// Run a single processing cycle and print its report.
    Cycle,
    /// Show the checkpoint, capture state, and recorded gaps.
    Status,
    /// Administer the capture log.
    Capture {
        #[command(subcommand)]
        action: CaptureCommands,
    },
    /// List change sets.
    ChangeSets(ChangeSetsArgs),
    /// List change records.
    Records(RecordsArgs),
    /// Show the full history of one entity.
    History(HistoryArgs),
}

/// Time window shared by the listing commands. Timestamps are RFC 3339.
#[derive(Clone, Debug, Args)]
pub struct WindowArgs {
    /// Inclusive lower bound on the change set time.
    #[arg(long)]
    pub since: Option<String>,
    /// Exclusive upper bound on the change set time.
    #[arg(long)]
    pub until: Option<String>,
    /// Resume after a cursor returned by a previous page.
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct ChangeSetsArgs {
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Clone, Debug, Args)]
pub struct RecordsArgs {
    /// Only records of this change set.
    #[arg(long)]
    pub change_set: Option<String>,
    /// Only records of this entity id.
    #[arg(long)]
    pub entity: Option<String>,
    /// Entity kind, e.g. resource, scalar-property.
    #[arg(long)]
    pub kind: Option<String>,
    /// insert, update, or delete.
    #[arg(long)]
    pub operation: Option<String>,
    /// Records that reference this entity id on either side.
    #[arg(long)]
    pub references: Option<String>,
    /// Narrow --references to one attribute.
    #[arg(long, requires = "references")]
    pub reference_attribute: Option<String>,
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Clone, Debug, Args)]
pub struct HistoryArgs {
    /// Entity id to look up.
    pub entity_id: String,
}
