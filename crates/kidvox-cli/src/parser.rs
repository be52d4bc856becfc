//! Main CLI parser and global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the kidvox speech orchestrator.
#[derive(Parser)]
#[command(name = "kidvox")]
#[command(about = "Read lessons aloud and listen for spoken answers")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
