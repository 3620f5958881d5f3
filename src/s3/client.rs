//! S3 transport: signed single-object GET and PUT
//!
//! - HTTP/1.1 through the hyper-util pooled client, native-tls for https
//! - One captured timestamp per request
//! - Payload hash computed from the body before sending (no UNSIGNED-PAYLOAD)
//! - Whole-call timeout, no retry

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

use crate::s3::canonical::{self, EMPTY_PAYLOAD_SHA256};
use crate::s3::signer::{S3SignerV4, SigningTime};
use crate::s3::types::{Credentials, Endpoint, ErrorDocument, ObjectAddress};

/// Hard limit for one whole call, body transfer included
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest accepted whole-call timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Read buffer used while hashing upload bodies
const HASH_CHUNK: usize = 64 * 1024;

/// Storage errors, one variant per failure class callers act on
#[derive(Error, Debug)]
pub enum StorageError {
    /// Missing or malformed configuration; detected before any network call
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote object absent (HTTP 404 on GET)
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Non-success HTTP status, network failure or timeout
    #[error("S3 error {}: {message}", status_label(.status))]
    Transport {
        status: Option<StatusCode>,
        message: String,
    },

    /// Local filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// HTTP status for transport failures that got a response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            StorageError::Transport { status, .. } => *status,
            StorageError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            _ => None,
        }
    }

    fn network(message: impl Into<String>) -> Self {
        StorageError::Transport {
            status: None,
            message: message.into(),
        }
    }

    fn timed_out(timeout: Duration) -> Self {
        Self::network(format!("request timed out after {}s", timeout.as_secs()))
    }
}

impl From<hyper_util::client::legacy::Error> for StorageError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        StorageError::network(format!("Request failed: {}", err))
    }
}

impl From<hyper::Error> for StorageError {
    fn from(err: hyper::Error) -> Self {
        StorageError::network(format!("Body error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn status_label(status: &Option<StatusCode>) -> String {
    match status {
        Some(status) => status.as_u16().to_string(),
        None => "(no response)".to_string(),
    }
}

/// Body of a successful GET. The caller must consume it; the client's
/// deadline keeps running while it does.
#[derive(Debug)]
pub struct ObjectBody {
    body: Incoming,
    content_length: Option<u64>,
    deadline: Instant,
    timeout: Duration,
}

impl ObjectBody {
    /// `Content-Length` announced by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Stream the body into `writer`, returning the number of bytes written.
    ///
    /// Fails if the stream ends short of the announced `Content-Length`.
    pub async fn copy_to<W>(self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let ObjectBody {
            body,
            content_length: expected,
            deadline,
            timeout,
        } = self;
        let copy = async move {
            let mut stream = BodyStream::new(body);
            let mut total_bytes = 0u64;
            while let Some(frame) = stream.next().await {
                let frame = frame?;
                if let Some(chunk) = frame.data_ref() {
                    writer.write_all(chunk).await?;
                    total_bytes += chunk.len() as u64;
                }
            }
            writer.flush().await?;
            Ok::<u64, StorageError>(total_bytes)
        };

        let total_bytes = tokio::time::timeout_at(deadline, copy)
            .await
            .map_err(|_| StorageError::timed_out(timeout))??;

        if let Some(expected) = expected {
            if expected != total_bytes {
                return Err(StorageError::network(format!(
                    "body ended after {} of {} bytes",
                    total_bytes, expected
                )));
            }
        }
        Ok(total_bytes)
    }

    /// Collect the whole body in memory
    pub async fn bytes(self) -> Result<Bytes> {
        let ObjectBody {
            body,
            deadline,
            timeout,
            ..
        } = self;
        let collected = tokio::time::timeout_at(deadline, body.collect())
            .await
            .map_err(|_| StorageError::timed_out(timeout))??;
        Ok(collected.to_bytes())
    }
}

/// S3 client for single-object transfers
///
/// Clone is cheap; clones share the HTTP connection pool. No signing state
/// is shared, so concurrent calls need no coordination.
#[derive(Clone)]
pub struct S3Client {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    signer: S3SignerV4,
    endpoint: Endpoint,
    timeout: Duration,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl S3Client {
    pub fn new(credentials: Credentials, endpoint: Endpoint) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));

        let tls = TlsConnector::new()
            .map_err(|e| StorageError::Config(format!("failed to build TLS connector: {}", e)))?;
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        let signer = S3SignerV4::for_endpoint(credentials, &endpoint);

        Ok(Self {
            client,
            signer,
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the whole-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deadline for a call starting now
    fn deadline(&self) -> Result<Instant> {
        Instant::now().checked_add(self.timeout).ok_or_else(|| {
            StorageError::Config(format!(
                "request timeout of {}s is out of range",
                self.timeout.as_secs()
            ))
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Build a signed request. `headers` keys must be lowercase.
    fn signed_request(
        &self,
        method: Method,
        address: &ObjectAddress,
        mut headers: BTreeMap<String, String>,
        payload_hash: &str,
        body: Bytes,
    ) -> Result<Request<Full<Bytes>>> {
        let url = self.endpoint.object_url(address);
        let uri = canonical::canonical_uri(&address.bucket, &address.key);
        headers.insert("host".to_string(), self.endpoint.host().to_string());

        let time = SigningTime::now();
        let signed_headers =
            self.signer
                .sign_request(method.as_str(), &uri, "", headers, payload_hash, &time);

        let mut req = Request::builder().method(method).uri(&url);
        for (key, value) in signed_headers.iter() {
            req = req.header(key, value);
        }

        req.body(Full::new(body)).map_err(|e| {
            StorageError::network(format!("Request build error: {}", e))
        })
    }

    /// Send with the call deadline applied to the response head
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        deadline: Instant,
    ) -> Result<Response<Incoming>> {
        let response = tokio::time::timeout_at(deadline, self.client.request(request))
            .await
            .map_err(|_| StorageError::timed_out(self.timeout))??;
        Ok(response)
    }

    /// Turn a failed response into a `Transport` error carrying its body
    async fn error_from_response(
        &self,
        response: Response<Incoming>,
        deadline: Instant,
    ) -> StorageError {
        let status = response.status();
        let body = match tokio::time::timeout_at(deadline, response.into_body().collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            _ => Bytes::new(),
        };
        let message = match ErrorDocument::parse(&body) {
            Some(doc) => doc.to_string(),
            None => String::from_utf8_lossy(&body).to_string(),
        };
        StorageError::Transport {
            status: Some(status),
            message,
        }
    }

    /// GET an object.
    ///
    /// 200 yields the body; 404 is `NotFound`; anything else is `Transport`.
    pub async fn get_object(&self, address: &ObjectAddress) -> Result<ObjectBody> {
        let deadline = self.deadline()?;
        let request = self.signed_request(
            Method::GET,
            address,
            BTreeMap::new(),
            EMPTY_PAYLOAD_SHA256,
            Bytes::new(),
        )?;

        debug!(bucket = %address.bucket, key = %address.key, "GET object");
        let response = self.send(request, deadline).await?;
        let status = response.status();
        debug!(bucket = %address.bucket, key = %address.key, status = status.as_u16(), "GET response");

        if status == StatusCode::NOT_FOUND {
            // Drain so the connection can go back to the pool
            let _ = tokio::time::timeout_at(deadline, response.into_body().collect()).await;
            return Err(StorageError::NotFound {
                bucket: address.bucket.clone(),
                key: address.key.clone(),
            });
        }

        if status != StatusCode::OK {
            return Err(self.error_from_response(response, deadline).await);
        }

        let content_length = response
            .headers()
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(ObjectBody {
            body: response.into_body(),
            content_length,
            deadline,
            timeout: self.timeout,
        })
    }

    /// PUT an object from a seekable body of exactly `size` bytes.
    ///
    /// The body is read once from the start to compute the payload hash,
    /// rewound, and read again for transmission. A body that yields a
    /// different number of bytes than `size` fails before anything is sent.
    pub async fn put_object<R>(&self, address: &ObjectAddress, body: &mut R, size: u64) -> Result<()>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        let deadline = self.deadline()?;

        let (payload_hash, data) = tokio::time::timeout_at(deadline, read_payload(body, size))
            .await
            .map_err(|_| StorageError::timed_out(self.timeout))??;

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );
        headers.insert("content-length".to_string(), size.to_string());

        let request =
            self.signed_request(Method::PUT, address, headers, &payload_hash, data)?;

        debug!(bucket = %address.bucket, key = %address.key, bytes = size, "PUT object");
        let response = self.send(request, deadline).await?;
        let status = response.status();
        debug!(bucket = %address.bucket, key = %address.key, status = status.as_u16(), "PUT response");

        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(self.error_from_response(response, deadline).await);
        }

        let _ = tokio::time::timeout_at(deadline, response.into_body().collect()).await;
        Ok(())
    }
}

/// Hash the first `size` bytes of `body`, rewind, then read them again.
///
/// Returns the lowercase hex SHA-256 and the bytes to send.
pub async fn read_payload<R>(body: &mut R, size: u64) -> Result<(String, Bytes)>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    body.seek(SeekFrom::Start(0)).await?;

    let mut hasher = Sha256::new();
    let mut hashed = 0u64;
    let mut buf = vec![0u8; HASH_CHUNK];
    let mut limited = (&mut *body).take(size);
    loop {
        let n = limited.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        hashed += n as u64;
    }
    if hashed != size {
        return Err(short_body(hashed, size));
    }
    let payload_hash = hex::encode(hasher.finalize());

    body.seek(SeekFrom::Start(0)).await?;
    let capacity = usize::try_from(size).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "object too large for memory")
    })?;
    let mut data = Vec::with_capacity(capacity);
    (&mut *body).take(size).read_to_end(&mut data).await?;
    if data.len() as u64 != size {
        return Err(short_body(data.len() as u64, size));
    }

    Ok((payload_hash, Bytes::from(data)))
}

fn short_body(read: u64, size: u64) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("body yielded {} bytes, expected {}", read, size),
    ))
}
