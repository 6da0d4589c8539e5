//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::track::TrackId;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Port to listen on (overrides the configuration)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Do not run the webhook change notifier
    #[arg(long)]
    pub no_notifier: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Track maintenance commands.
#[derive(Debug, Subcommand)]
pub enum TracksCommand {
    /// List stored tracks
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show one track
    Show {
        /// Track id
        id: TrackId,
    },

    /// Download, parse and store a track
    Add {
        /// URL of the IGC file
        url: String,
    },

    /// Delete every stored track
    Purge {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
