use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Run => commands::run::handle(ctx).await,
        Commands::Cycle => commands::cycle::handle(ctx, flags).await,
        Commands::Status => commands::status::handle(ctx, flags).await,
        Commands::Capture { action } => commands::capture::handle(&action, ctx, flags).await,
        Commands::ChangeSets(args) => commands::change_sets::handle(&args, ctx, flags).await,
        Commands::Records(args) => commands::records::handle(&args, ctx, flags).await,
        Commands::History(args) => commands::history::handle(&args, ctx, flags).await,
    }
}
