use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mirror workspace folders from WSL to a cloud-synced location"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write log output to this file
    #[arg(short, long, env = "WSYNC_LOG_PATH", global = true)]
    pub log: Option<PathBuf>,

    /// Configuration file to use
    #[arg(short, long, env = "WSYNC_CONFIG_PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update the configuration file interactively
    Init,

    /// Show how every folder maps to its destination
    Status {
        /// Print the resolved plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the copy tool for every enabled folder
    Start {
        /// Print the commands instead of running them
        #[arg(short, long)]
        dry_run: bool,
    },
}
