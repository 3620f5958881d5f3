//! S3 client module with AWS SigV4 signing
//!
//! This module provides:
//! - Request canonicalization (`canonical`)
//! - AWS Signature Version 4 signing (`signer`)
//! - Signed single-object GET/PUT over HTTP (`client`)

pub mod canonical;
pub mod client;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use client::{ObjectBody, Result, S3Client, StorageError, DEFAULT_TIMEOUT, MAX_TIMEOUT};
pub use signer::{S3SignerV4, Signature, SigningKeyChain, SigningTime};
pub use types::{Credentials, Endpoint, ErrorDocument, ObjectAddress};
