//! S3 value types: credentials, endpoint, object address, error documents

use std::fmt;

use hyper::Uri;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::s3::canonical;
use crate::s3::client::{Result, StorageError};

/// Access key pair used to sign every request.
///
/// The secret never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    /// Create credentials, rejecting empty values
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Result<Self> {
        let access_key = access_key.into();
        let secret_key = secret_key.into();
        if access_key.trim().is_empty() || secret_key.trim().is_empty() {
            return Err(StorageError::Config(
                "access key and secret key must both be set".to_string(),
            ));
        }
        Ok(Self {
            access_key,
            secret_key,
        })
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Where requests go and which region they are signed for.
///
/// Only the scheme and authority of the base URL are used; objects are
/// always addressed path-style as `{base}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: String,
    host: String,
    region: String,
}

impl Endpoint {
    /// Service name bound into every credential scope
    pub const SERVICE: &'static str = "s3";

    pub fn new(base_url: &str, region: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let uri: Uri = base_url
            .parse()
            .map_err(|e| StorageError::Config(format!("invalid endpoint {:?}: {}", base_url, e)))?;

        let scheme = uri.scheme_str().unwrap_or("");
        if scheme != "https" && scheme != "http" {
            return Err(StorageError::Config(format!(
                "endpoint {:?} must be an absolute http(s) URL",
                base_url
            )));
        }
        if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
            return Err(StorageError::Config(format!(
                "endpoint {:?} must not carry a path or query",
                base_url
            )));
        }
        let authority = uri.authority().ok_or_else(|| {
            StorageError::Config(format!("endpoint {:?} has no host", base_url))
        })?;

        // Default ports are omitted from Host, as HTTP clients send it
        let host = match (scheme, authority.port_u16()) {
            ("https", Some(443)) | ("http", Some(80)) | (_, None) => authority.host().to_string(),
            (_, Some(port)) => format!("{}:{}", authority.host(), port),
        };

        let region = region.trim();
        Ok(Self {
            base_url,
            host,
            region: if region.is_empty() {
                crate::config::DEFAULT_REGION.to_string()
            } else {
                region.to_string()
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Value of the `Host` header
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Full request URL for an object
    pub fn object_url(&self, address: &ObjectAddress) -> String {
        let path = canonical::canonical_uri(&address.bucket, &address.key);
        let mut url = String::with_capacity(self.base_url.len() + path.len());
        url.push_str(&self.base_url);
        url.push_str(&path);
        url
    }
}

/// A single blob: bucket plus key. Keys may contain `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectAddress {
    pub bucket: String,
    pub key: String,
}

impl ObjectAddress {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// `<Error>` document returned by S3-compatible services on failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDocument {
    pub code: Option<String>,
    pub message: Option<String>,
    pub request_id: Option<String>,
}

impl ErrorDocument {
    /// Parse an error body. Returns `None` when the body is not an S3 error document.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text_start = true;
        reader.config_mut().trim_text_end = true;

        let mut doc = ErrorDocument::default();
        let mut saw_error = false;
        let mut current_text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() == b"Error" {
                        saw_error = true;
                    }
                    current_text.clear();
                }
                Ok(Event::Text(e)) => {
                    current_text.clear();
                    current_text.push_str(&e.unescape().ok()?);
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"Code" => doc.code = Some(std::mem::take(&mut current_text)),
                    b"Message" => doc.message = Some(std::mem::take(&mut current_text)),
                    b"RequestId" => doc.request_id = Some(std::mem::take(&mut current_text)),
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(_) => return None,
                _ => {}
            }
        }

        saw_error.then_some(doc)
    }
}

impl fmt::Display for ErrorDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{}: {}", code, message),
            (Some(code), None) => write!(f, "{}", code),
            (None, Some(message)) => write!(f, "{}", message),
            (None, None) => write!(f, "unknown error"),
        }
    }
}
