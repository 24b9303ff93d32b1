//! Signing primitives shared by the provider protocols.
//!
//! Every backend validates its signature byte-for-byte, so these helpers are
//! deliberately tiny and pure: given identical inputs (including the
//! timestamp, which callers pass in) they produce identical output, which is
//! what the protocol tests assert against known vectors.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::{Digest, Sha1};

type HmacSha1 = Hmac<Sha1>;

/// Raw HMAC-SHA1 digest.
pub fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    // HMAC accepts keys of any length; new_from_slice only fails for
    // variable-output MACs, which HMAC-SHA1 is not.
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA1, standard base64 (signed-header REST authorization).
pub fn hmac_sha1_b64(key: &str, data: &str) -> String {
    STANDARD.encode(hmac_sha1(key.as_bytes(), data.as_bytes()))
}

/// HMAC-SHA1, lowercase hex (query-signed REST sign key and signature).
pub fn hmac_sha1_hex(key: &str, data: &str) -> String {
    hex::encode(hmac_sha1(key.as_bytes(), data.as_bytes()))
}

/// SHA1 of `data`, lowercase hex.
pub fn sha1_hex(data: &str) -> String {
    hex::encode(Sha1::digest(data.as_bytes()))
}

/// URL-safe base64 with padding (token-policy encoding).
pub fn urlsafe_b64(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// RFC 1123 date in GMT, the format object-store `Date` headers require:
/// `Wed, 06 Aug 2026 10:20:30 GMT`.
pub fn gmt_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Everything except RFC 3986 unreserved characters (`A–Z a–z 0–9 - . _ ~`).
const CANONICAL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Canonical percent-encoding for query-signed requests: space becomes
/// `%20` (never `+`), `*` becomes `%2A`, `~` stays literal.
pub fn canonical_encode(s: &str) -> String {
    utf8_percent_encode(s, CANONICAL).to_string()
}
