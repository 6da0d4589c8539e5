//! Command-line interface for trackfeed.
//!
//! This module provides the CLI structure for the `trackfeed` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ServeCommand, StatusCommand, TracksCommand};

/// trackfeed - Flight track ingestion with a ticker feed and webhooks
///
/// Accepts IGC track URLs over HTTP, serves the stored tracks and a
/// cursor-based ticker, and notifies registered webhooks when new tracks
/// arrive.
#[derive(Debug, Parser)]
#[command(name = "trackfeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server and the change notifier
    Serve(ServeCommand),

    /// Show storage status
    Status(StatusCommand),

    /// Inspect or modify stored tracks
    #[command(subcommand)]
    Tracks(TracksCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "trackfeed");
    }

    #[test]
    fn test_verbosity() {
        use crate::logging::Verbosity;

        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(3, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["trackfeed", "serve", "--port", "9000", "--no-notifier"])
            .unwrap();
        match cli.command {
            Command::Serve(serve) => {
                assert_eq!(serve.port, Some(9000));
                assert!(serve.no_notifier);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_tracks_show() {
        let cli = Cli::try_parse_from(["trackfeed", "tracks", "show", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Tracks(TracksCommand::Show { id: 3 })
        ));
    }

    #[test]
    fn test_parse_tracks_show_rejects_non_integer() {
        assert!(Cli::try_parse_from(["trackfeed", "tracks", "show", "x"]).is_err());
    }

    #[test]
    fn test_parse_tracks_purge() {
        let cli = Cli::try_parse_from(["trackfeed", "tracks", "purge", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Tracks(TracksCommand::Purge { yes: true })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["trackfeed", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let cli = Cli::try_parse_from(["trackfeed", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_config_validate() {
        let cli =
            Cli::try_parse_from(["trackfeed", "config", "validate", "--file", "/tmp/x.toml"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }
}
