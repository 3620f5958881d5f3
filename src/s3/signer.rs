//! AWS Signature Version 4 signer for S3 requests
//!
//! - One captured timestamp per request feeds both `x-amz-date` and the
//!   credential scope
//! - Signing keys are derived fresh per request; nothing is cached, so a
//!   signer can be shared across tasks without locking
//! - Every stage of the key chain is a raw 32-byte array, never hex

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::s3::canonical::{self, CanonicalHeaders};
use crate::s3::types::{Credentials, Endpoint};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Terminator of every credential scope
const SCOPE_TERMINATOR: &str = "aws4_request";

/// The two renderings of one captured instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningTime {
    /// `YYYYMMDDThhmmssZ`
    pub amz_date: String,
    /// `YYYYMMDD`
    pub date_stamp: String,
}

impl SigningTime {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            amz_date: now.format("%Y%m%dT%H%M%SZ").to_string(),
            date_stamp: now.format("%Y%m%d").to_string(),
        }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }
}

/// The four derived keys of the SigV4 chain
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKeyChain {
    pub k_date: [u8; 32],
    pub k_region: [u8; 32],
    pub k_service: [u8; 32],
    pub k_signing: [u8; 32],
}

impl SigningKeyChain {
    /// `HMAC("AWS4"+secret, date) -> region -> service -> "aws4_request"`
    pub fn derive(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Self {
        let mut aws4_key = Vec::with_capacity(4 + secret_key.len());
        aws4_key.extend_from_slice(b"AWS4");
        aws4_key.extend_from_slice(secret_key.as_bytes());

        let k_date = hmac_sha256(&aws4_key, date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, region.as_bytes());
        let k_service = hmac_sha256(&k_region, service.as_bytes());
        let k_signing = hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes());

        Self {
            k_date,
            k_region,
            k_service,
            k_signing,
        }
    }
}

impl std::fmt::Debug for SigningKeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKeyChain(<redacted>)")
    }
}

/// Result of signing one canonical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub credential_scope: String,
    pub string_to_sign: String,
    /// 64 lowercase hex characters
    pub signature: String,
    /// Full `Authorization` header value
    pub authorization: String,
}

/// HMAC-SHA256 returning a fixed-size array
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// AWS Signature Version 4 signer bound to one credential pair and region
#[derive(Debug, Clone)]
pub struct S3SignerV4 {
    credentials: Credentials,
    region: String,
}

impl S3SignerV4 {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    pub fn for_endpoint(credentials: Credentials, endpoint: &Endpoint) -> Self {
        Self::new(credentials, endpoint.region())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// `date/region/s3/aws4_request`
    pub fn credential_scope(&self, date_stamp: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            date_stamp,
            self.region,
            Endpoint::SERVICE,
            SCOPE_TERMINATOR
        )
    }

    pub fn signing_keys(&self, date_stamp: &str) -> SigningKeyChain {
        SigningKeyChain::derive(
            self.credentials.secret_key(),
            date_stamp,
            &self.region,
            Endpoint::SERVICE,
        )
    }

    /// Sign a finished canonical request
    pub fn sign(
        &self,
        canonical_request: &str,
        signed_headers: &str,
        time: &SigningTime,
    ) -> Signature {
        let credential_scope = self.credential_scope(&time.date_stamp);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            time.amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let keys = self.signing_keys(&time.date_stamp);
        let signature = hex::encode(hmac_sha256(&keys.k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key(),
            credential_scope,
            signed_headers,
            signature
        );

        Signature {
            credential_scope,
            string_to_sign,
            signature,
            authorization,
        }
    }

    /// Add `x-amz-date`, `x-amz-content-sha256` and `authorization` to a
    /// header map and return it.
    ///
    /// Header names in `headers` must already be lowercase; `host` must be
    /// present because it is part of the signed set.
    pub fn sign_request(
        &self,
        method: &str,
        uri: &str,
        query: &str,
        mut headers: BTreeMap<String, String>,
        payload_hash: &str,
        time: &SigningTime,
    ) -> BTreeMap<String, String> {
        debug_assert!(headers.contains_key("host"), "host must be signed");

        headers.insert("x-amz-date".to_string(), time.amz_date.clone());
        headers.insert(
            "x-amz-content-sha256".to_string(),
            payload_hash.to_string(),
        );

        let pairs: Vec<(&String, &String)> = headers.iter().collect();
        let canonical_headers: CanonicalHeaders = canonical::canonical_headers(&pairs);
        let canonical_query = canonical::canonical_query(query);
        let canonical_request = canonical::canonical_request(
            method,
            uri,
            &canonical_query,
            &canonical_headers,
            payload_hash,
        );

        let signature = self.sign(&canonical_request, &canonical_headers.signed, time);
        tracing::trace!(
            canonical_request = %canonical_request,
            string_to_sign = %signature.string_to_sign,
            "sigv4"
        );

        headers.insert("authorization".to_string(), signature.authorization);
        headers
    }
}
