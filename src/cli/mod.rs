use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "tunelib")]
#[command(about = "Query a local media library through the tunelib daemon")]
#[command(version)]
pub struct Cli {
    /// Override the storage directory from the config file
    #[arg(long, global = true, env = "TUNELIB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add an entry to the media library
    Add {
        /// Location of the media file
        url: String,
        /// Track title
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        artist: Option<String>,
        #[arg(short = 'b', long)]
        album: Option<String>,
        /// Duration in seconds or MM:SS format
        #[arg(short, long, default_value = "0")]
        duration: String,
    },

    /// List every entry in the library
    List,

    /// Run a medialib query and print one dict per row
    Select {
        /// SQL query, e.g. "SELECT title, artist FROM media"
        query: String,
    },

    /// Run a medialib query and print the first column of each row
    Column {
        /// SQL query
        query: String,
    },

    /// Show the keys present in the rows of a medialib query
    Keys {
        /// SQL query
        query: String,
    },

    /// Show a status line for one entry
    Show {
        /// Entry id
        id: u32,
    },

    /// Show daemon status
    Status,

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show whether the daemon is running
    Status,
    /// Run daemon in foreground (internal use)
    Run,
}
