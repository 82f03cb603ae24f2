use std::path::PathBuf;

use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `chrond` binary.
#[derive(Debug, Parser)]
#[command(
    name = "chrond",
    version,
    about = "Chronicle - audit trail for a typed entity repository"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Max results to return
    #[arg(short, long, global = true)]
    pub limit: Option<u32>,

    /// Extra config file layered above the project config
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            limit: self.limit,
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands, OutputFormat};
    use crate::cli::subcommands::CaptureCommands;

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from(["chrond", "--format", "raw", "--verbose", "cycle"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Cycle));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chrond",
            "status",
            "--quiet",
            "--config",
            "/tmp/chronicle.toml",
        ])
        .expect("cli should parse");

        assert!(cli.quiet);
        assert_eq!(
            cli.global_flags().config.as_deref(),
            Some(Path::new("/tmp/chronicle.toml"))
        );
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn capture_purge_takes_a_position() {
        let cli =
            Cli::try_parse_from(["chrond", "capture", "purge", "42"]).expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Capture {
                action: CaptureCommands::Purge { through: 42 }
            }
        ));
    }

    #[test]
    fn records_filters_parse() {
        let cli = Cli::try_parse_from([
            "chrond",
            "records",
            "--kind",
            "relationship",
            "--references",
            "res-1",
            "--limit",
            "5",
        ])
        .expect("cli should parse");
        assert_eq!(cli.limit, Some(5));
        match cli.command {
            Commands::Records(args) => {
                assert_eq!(args.kind.as_deref(), Some("relationship"));
                assert_eq!(args.references.as_deref(), Some("res-1"));
            }
            other => panic!("expected records, got {other:?}"),
        }
    }

    #[test]
    fn output_format_rejects_invalid_value() {
        assert!(Cli::try_parse_from(["chrond", "--format", "table", "status"]).is_err());
    }
}
