//! CLI module for shardstore
//!
//! Provides command-line interface for:
//! - inspect: Print every owned partition's persisted state
//! - get: Print one document's metadata

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{get, inspect, run, run_command};
pub use errors::{CliError, CliResult};
pub use io::write_response;
