//! Index admin library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (ensure, status, rebuild, validate)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, Target};
pub use commands::{ensure, load_settings, rebuild, run, status, validate, Manager};
