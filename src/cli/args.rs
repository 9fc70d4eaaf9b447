//! CLI argument definitions using clap
//!
//! Commands:
//! - shardstore inspect --config <path>
//! - shardstore get --config <path> --partition <p> --key <k> [--deleted]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shardstore - inspect a shard's data directory
#[derive(Parser, Debug)]
#[command(name = "shardstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the persisted state of every partition the shard owns
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./shardstore.json")]
        config: PathBuf,
    },

    /// Print the metadata of a single document
    Get {
        /// Path to configuration file
        #[arg(long, default_value = "./shardstore.json")]
        config: PathBuf,

        /// Partition holding the document
        #[arg(long)]
        partition: u16,

        /// Document key
        #[arg(long)]
        key: String,

        /// Also return tombstones
        #[arg(long)]
        deleted: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
