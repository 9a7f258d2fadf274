//! Command line definition for the bkup binary

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "bkup - back up, fetch, delete and list files on a bkup server"
)]
pub struct Args {
    /// Client id sent with every request (random when omitted)
    #[arg(long)]
    pub uid: Option<u32>,

    /// Directory holding server.info, backup.info and the local files
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Settings file (defaults to bkup.toml inside --dir)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Append an operation log to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Write the operation log as JSON lines
    #[arg(long)]
    pub json_log: bool,

    /// More diagnostics (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Hide transfer progress bars
    #[arg(long)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// List the files backed up for this client
    List,

    /// Back up a local file, or every file in backup.info with --all
    Backup {
        #[arg(required_unless_present = "all")]
        file: Option<String>,

        #[arg(long, conflicts_with = "file")]
        all: bool,
    },

    /// Download a backed up file
    Fetch {
        /// Name of the file on the server
        name: String,
        /// Local path to save it as
        save_as: PathBuf,
    },

    /// Erase a file from the backup
    Delete { name: String },

    /// Run the demonstration sequence against the configured server
    Demo,
}
