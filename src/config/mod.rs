use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::s3::{self, Credentials, Endpoint, ObjectAddress, StorageError};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "auto";

/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Bucket holding the database snapshot
pub const DEFAULT_BUCKET: &str = "oaamonitor";

/// Object key of the database snapshot
pub const DEFAULT_KEY: &str = "oaamonitor.db";

/// Local snapshot path when `DATABASE_PATH` is unset
pub const DEFAULT_DATABASE_PATH: &str = "./data/oaamonitor.db";

/// Snapshot storage configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// AWS access key ID
    #[serde(default)]
    pub access_key: String,

    /// AWS secret access key
    #[serde(default)]
    pub secret_key: String,

    /// Signing region (default: auto)
    #[serde(default = "default_region")]
    pub region: String,

    /// Base URL of the S3-compatible service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_key")]
    pub key: String,

    /// Whole-call timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

fn default_request_timeout() -> u64 {
    s3::DEFAULT_TIMEOUT.as_secs()
}

impl StorageConfig {
    /// Configuration with the given credentials and every other field defaulted
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: default_region(),
            endpoint: default_endpoint(),
            bucket: default_bucket(),
            key: default_key(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn credentials(&self) -> s3::Result<Credentials> {
        Credentials::new(self.access_key.clone(), self.secret_key.clone())
    }

    /// Empty `endpoint` or `region` fall back to the defaults, as unset variables do
    pub fn endpoint(&self) -> s3::Result<Endpoint> {
        Endpoint::new(
            or_default(&self.endpoint, DEFAULT_ENDPOINT),
            or_default(&self.region, DEFAULT_REGION),
        )
    }

    pub fn address(&self) -> ObjectAddress {
        ObjectAddress::new(self.bucket.clone(), self.key.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Check everything a request needs, without touching the network
    pub fn validate(&self) -> s3::Result<()> {
        self.credentials()?;
        self.endpoint()?;
        if self.bucket.trim().is_empty() || self.key.trim().is_empty() {
            return Err(StorageError::Config(
                "bucket and key must both be set".to_string(),
            ));
        }
        if self.request_timeout == 0 {
            return Err(StorageError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout > s3::MAX_TIMEOUT.as_secs() {
            return Err(StorageError::Config(format!(
                "request_timeout must be at most {}s",
                s3::MAX_TIMEOUT.as_secs()
            )));
        }
        Ok(())
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        default
    } else {
        value
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<StorageConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: StorageConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Build configuration from a variable lookup. Empty values count as unset.
///
/// - AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY
/// - AWS_REGION (optional, defaults to auto)
/// - AWS_ENDPOINT_URL_S3 (optional)
/// - OAAMONITOR_BUCKET / OAAMONITOR_KEY (optional)
/// - OAAMONITOR_REQUEST_TIMEOUT in seconds (optional)
///
/// Missing credentials are not an error here; `StorageConfig::validate`
/// reports them.
pub fn from_vars<F>(lookup: F) -> Result<StorageConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let mut config = StorageConfig::new(
        var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
        var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
    );

    if let Some(region) = var("AWS_REGION") {
        config.region = region;
    }
    if let Some(endpoint) = var("AWS_ENDPOINT_URL_S3") {
        config.endpoint = endpoint;
    }
    if let Some(bucket) = var("OAAMONITOR_BUCKET") {
        config.bucket = bucket;
    }
    if let Some(key) = var("OAAMONITOR_KEY") {
        config.key = key;
    }
    if let Some(timeout) = var("OAAMONITOR_REQUEST_TIMEOUT") {
        config.request_timeout = timeout
            .trim()
            .parse()
            .context(format!("Invalid OAAMONITOR_REQUEST_TIMEOUT: {:?}", timeout))?;
    }

    Ok(config)
}

/// Load configuration from environment variables, reading `.env` first if present
pub fn load_from_env() -> Result<StorageConfig> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();
    from_vars(|name| std::env::var(name).ok())
}

/// Load configuration from a YAML file if a path is given, else from the environment
pub fn load_config(config_path: Option<&str>) -> Result<StorageConfig> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}
