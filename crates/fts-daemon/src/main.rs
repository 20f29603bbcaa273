//! Message full-text index admin
//!
//! # Usage
//!
//! ```bash
//! fts-admin ensure [--backend sqlite|postgres] [--database-url URL]
//! fts-admin status [--backend sqlite|postgres]
//! fts-admin rebuild [--backend sqlite|postgres]
//! fts-admin validate [--backend sqlite|postgres]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/message-fts/config.toml)
//! 3. Environment variables (FTS_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use fts_daemon::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
