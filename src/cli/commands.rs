use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::StorageConfig;
use crate::s3::StorageError;
use crate::storage::Storage;

/// Restore the snapshot to `path`
pub async fn cmd_download(config: &StorageConfig, path: &str) -> Result<()> {
    let storage = Storage::new(config).context("Failed to create storage client")?;
    info!(address = %storage.address(), path = %path, "downloading database snapshot");

    match storage.download(path).await {
        Ok(_) => Ok(()),
        Err(e @ StorageError::NotFound { .. }) => {
            warn!(address = %storage.address(), "no backup exists yet");
            Err(e).context("Failed to download database file")
        }
        Err(e) => {
            error!(error = %e, "snapshot download failed");
            Err(e).context("Failed to download database file")
        }
    }
}

/// Back up the database at `path`
pub async fn cmd_upload(config: &StorageConfig, path: &str) -> Result<()> {
    let storage = Storage::new(config).context("Failed to create storage client")?;
    info!(address = %storage.address(), path = %path, "uploading database snapshot");

    storage.upload(path).await.map(|_| ()).map_err(|e| {
        error!(error = %e, "snapshot upload failed");
        anyhow::Error::new(e).context("Failed to upload database file")
    })
}
