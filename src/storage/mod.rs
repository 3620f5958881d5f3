//! Database snapshot backup and restore
//!
//! The only surface the rest of the application uses. HTTP, signing and
//! canonicalization stay behind `download` and `upload`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::config::{self, StorageConfig};
use crate::s3::{ObjectAddress, Result, S3Client, StorageError};

/// Write buffer for downloads
const WRITE_BUFFER: usize = 256 * 1024;

/// Snapshot storage bound to one object address
#[derive(Debug, Clone)]
pub struct Storage {
    client: S3Client,
    address: ObjectAddress,
}

impl Storage {
    /// Validate `config` and build the client. Fails before any network activity.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let client = S3Client::new(config.credentials()?, config.endpoint()?)?
            .with_timeout(config.request_timeout());
        Ok(Self {
            client,
            address: config.address(),
        })
    }

    /// Build from `AWS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let config = config::load_from_env().map_err(|e| StorageError::Config(format!("{:#}", e)))?;
        Self::new(&config)
    }

    pub fn address(&self) -> &ObjectAddress {
        &self.address
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    /// Fetch the snapshot into `local_path`, returning the bytes written.
    ///
    /// The body lands in `<local_path>.part` and is renamed into place only
    /// once complete, so an error never replaces an existing snapshot. An
    /// error return always means "no usable file from this call". The
    /// `.part` file is removed on error and when the future is dropped.
    pub async fn download(&self, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        let started = Instant::now();

        let body = self.client.get_object(&self.address).await?;

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let part = PartFile::new(part_path(local_path));
        let file = File::create(part.path()).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
        let bytes = body.copy_to(&mut writer).await?;
        writer.into_inner().sync_all().await?;
        fs::rename(part.path(), local_path).await?;
        part.keep();

        info!(
            bucket = %self.address.bucket,
            key = %self.address.key,
            path = %local_path.display(),
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot downloaded"
        );
        Ok(bytes)
    }

    /// Send the file at `local_path` as the snapshot, returning its size
    pub async fn upload(&self, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        let started = Instant::now();

        let mut file = File::open(local_path).await?;
        let size = file.metadata().await?.len();

        self.client.put_object(&self.address, &mut file, size).await?;

        info!(
            bucket = %self.address.bucket,
            key = %self.address.key,
            path = %local_path.display(),
            bytes = size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot uploaded"
        );
        Ok(size)
    }
}

/// Sibling temporary path: `<name>.part`
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Removes the temporary download file on drop unless kept
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file has been renamed into place
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "partial download not removed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("./data/oaamonitor.db")),
            PathBuf::from("./data/oaamonitor.db.part")
        );
        assert_eq!(part_path(Path::new("snap.db")), PathBuf::from("snap.db.part"));
    }

    #[tokio::test]
    async fn test_new_rejects_missing_credentials() {
        let config = StorageConfig::new("", "");
        let err = Storage::new(&config).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_part_file_removed_unless_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("oaamonitor.db.part");

        std::fs::write(&path, b"partial").unwrap();
        drop(PartFile::new(path.clone()));
        assert!(!path.exists());

        std::fs::write(&path, b"complete").unwrap();
        PartFile::new(path.clone()).keep();
        assert!(path.exists());

        // Already gone is fine
        std::fs::remove_file(&path).unwrap();
        drop(PartFile::new(path.clone()));
    }

    #[tokio::test]
    async fn test_new_rejects_out_of_range_timeout() {
        let mut config = StorageConfig::new("key", "secret");
        config.request_timeout = u64::MAX;
        let err = Storage::new(&config).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_error() {
        let config = StorageConfig::new("key", "secret").with_endpoint("http://127.0.0.1:9");
        let storage = Storage::new(&config).unwrap();
        let err = storage
            .upload("/nonexistent/oaamonitor.db")
            .await
            .unwrap_err();
        match err {
            StorageError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
