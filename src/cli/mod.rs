//! Command-line surface for snapshot backup and restore
//!
//! ```bash
//! # Restore before serving
//! oaamonitor-storage download --path ./data/oaamonitor.db
//!
//! # Back up after a refresh
//! oaamonitor-storage upload --path ./data/oaamonitor.db
//! ```

pub mod args;
pub mod commands;

use anyhow::Result;

use crate::config;
use args::{Cli, Commands};
use commands::{cmd_download, cmd_upload};

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    tracing::debug!(config = ?config, "loaded configuration");

    match cli.command {
        Commands::Download { path } => cmd_download(&config, &path).await,
        Commands::Upload { path } => cmd_upload(&config, &path).await,
    }
}
