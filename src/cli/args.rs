use clap::{Parser, Subcommand};

use crate::config::DEFAULT_DATABASE_PATH;

/// oaamonitor-storage - back up and restore the oaamonitor database snapshot
#[derive(Parser, Debug)]
#[command(name = "oaamonitor-storage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML config file (defaults to AWS_* environment variables)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the snapshot from object storage into a local file
    Download {
        /// Local database path
        #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
        path: String,
    },

    /// Store a local database file as the snapshot
    Upload {
        /// Local database path
        #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
        path: String,
    },
}
