//! Command-line interface for grade-forge.
//!
//! Provides the `run`, `grade` and `list` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
