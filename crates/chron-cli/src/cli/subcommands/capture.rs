use clap::Subcommand;

/// Capture log administration. Each action waits for a running cycle.
#[derive(Clone, Debug, Subcommand)]
pub enum CaptureCommands {
    /// Start capturing writes.
    Enable {
        /// Storage location recorded for the capture log.
        #[arg(long)]
        storage: Option<String>,
    },
    /// Stop capturing; unprocessed entries are discarded and recorded as a gap.
    Disable,
    /// Create a new capture instance for a source table.
    Replace {
        /// Source table, e.g. resources.
        table: String,
    },
    /// Discard entries up to and including a log position.
    Purge {
        /// Last log position to discard.
        through: i64,
    },
}
