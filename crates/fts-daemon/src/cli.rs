//! CLI argument parsing for the index admin tool.
//!
//! CLI flags override every other config source.

use clap::{Args, Parser, Subcommand};
use fts_types::BackendKind;

/// Message full-text index administration
///
/// Checks, rebuilds and reports on the derived search index of each backend.
#[derive(Parser, Debug)]
#[command(name = "fts-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/message-fts/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which backend a command acts on.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Backend to operate on (sqlite, postgres)
    #[arg(short, long, default_value = "sqlite")]
    pub backend: BackendKind,

    /// Override the backend's database URL
    #[arg(long)]
    pub database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the startup check; if the index cannot be trusted, rebuild it and
    /// wait for the result
    Ensure {
        #[command(flatten)]
        target: Target,
    },

    /// Print flags, version record and live schema checks as JSON
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Rebuild the index now and wait for the result
    Rebuild {
        #[command(flatten)]
        target: Target,
    },

    /// Check the index schema objects without changing anything
    Validate {
        #[command(flatten)]
        target: Target,
    },
}

impl Commands {
    pub fn target(&self) -> &Target {
        match self {
            Commands::Ensure { target }
            | Commands::Status { target }
            | Commands::Rebuild { target }
            | Commands::Validate { target } => target,
        }
    }
}
