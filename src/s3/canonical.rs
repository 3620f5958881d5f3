//! SigV4 request canonicalization
//!
//! Pure string builders for the pieces of a canonical request. Inputs are
//! assumed to be valid UTF-8 header names/values and object keys; anything
//! else is a caller bug, not a runtime condition.

use std::collections::BTreeMap;

/// Hex lookup table for percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA-256 of the empty byte string, lowercase hex
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Canonical header block plus the matching signed-header list.
///
/// Both are produced from one sorted pass so their ordering always agrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHeaders {
    /// `name:value\n` per header, sorted by name
    pub block: String,
    /// Header names joined with `;`, same order as `block`
    pub signed: String,
}

/// RFC 3986 unreserved-set encoding: `A-Z a-z 0-9 - _ . ~` pass through,
/// every other byte becomes `%XX` with uppercase hex.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    uri_encode_into(&mut result, s);
    result
}

fn uri_encode_into(buf: &mut String, s: &str) {
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                buf.push(byte as char);
            }
            _ => {
                buf.push('%');
                buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
}

/// `/bucket/key` with each `/`-separated key segment encoded on its own
pub fn canonical_uri(bucket: &str, key: &str) -> String {
    let mut uri = String::with_capacity(bucket.len() + key.len() + 16);
    uri.push('/');
    uri.push_str(bucket);
    uri.push('/');
    for (i, segment) in key.split('/').enumerate() {
        if i > 0 {
            uri.push('/');
        }
        uri_encode_into(&mut uri, segment);
    }
    uri
}

/// Decode one query component the way form parsers do: `+` is a space,
/// then percent escapes. Undecodable input is kept as-is.
fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}

/// Sorted, re-encoded `key=value` pairs joined with `&`.
///
/// Pairs sort by encoded key, then encoded value. A parameter without `=`
/// becomes `name=`. Empty input yields an empty string.
pub fn canonical_query(raw_query: &str) -> String {
    let raw_query = raw_query.strip_prefix('?').unwrap_or(raw_query);
    if raw_query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = raw_query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                uri_encode(&decode_component(key)),
                uri_encode(&decode_component(value)),
            )
        })
        .collect();

    params.sort_unstable();

    let mut result = String::with_capacity(raw_query.len() + 16);
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            result.push('&');
        }
        result.push_str(key);
        result.push('=');
        result.push_str(value);
    }
    result
}

/// Lower-case names, trim values, sort by name.
///
/// Repeated names are merged into one entry with values joined by `,`
/// in the order they were given.
pub fn canonical_headers<K, V>(headers: &[(K, V)]) -> CanonicalHeaders
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let value = value.as_ref().trim();
        merged
            .entry(name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let mut block = String::with_capacity(merged.len() * 64);
    let mut signed = String::with_capacity(merged.len() * 20);
    for (name, value) in &merged {
        block.push_str(name);
        block.push(':');
        block.push_str(value);
        block.push('\n');

        if !signed.is_empty() {
            signed.push(';');
        }
        signed.push_str(name);
    }

    CanonicalHeaders { block, signed }
}

/// Join the canonical pieces in SigV4 order.
///
/// The header block already ends in `\n`, which produces the blank line
/// before the signed-header list.
pub fn canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &CanonicalHeaders,
    payload_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, uri, query, headers.block, headers.signed, payload_hash
    )
}
