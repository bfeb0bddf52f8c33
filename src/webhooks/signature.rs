//! Inbound webhook authenticity checks (HMAC-SHA256).
//!
//! The source host signs each delivery body with the shared secret and sends
//! the digest as `sha256=<hex>`. The check runs over the exact raw bytes,
//! before the body is parsed.
//!
//! With no secret configured the result is [`SignatureCheck::Skipped`], never
//! `Valid`, so callers can log that they are running in reduced-security mode.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm prefix on the signature header value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Outcome of checking a delivery signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// The signature matches the body under the configured secret.
    Valid,

    /// A secret is configured and the signature is missing, malformed or wrong.
    Invalid,

    /// No secret is configured; nothing was verified.
    Skipped,
}

/// Decodes a `sha256=<hex>` header value into digest bytes.
///
/// Returns `None` for a missing prefix, another algorithm, or bad hex.
///
/// # Examples
///
/// ```
/// use codebeamer_sync::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=00ff"), Some(vec![0x00, 0xff]));
/// assert!(parse_signature_header("sha1=00ff").is_none());
/// assert!(parse_signature_header("sha256=zz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_digest = header.trim().strip_prefix(SIGNATURE_PREFIX)?;
    hex::decode(hex_digest).ok()
}

/// Computes HMAC-SHA256 of `payload` keyed by `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats digest bytes as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(signature))
}

/// Verifies a signature header against a payload and a configured secret.
///
/// The digest comparison is constant-time (delegated to `Mac::verify_slice`).
/// Malformed headers yield `false` and never panic.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Checks a delivery against an optional secret.
///
/// Fails closed: with a secret configured, an absent header is `Invalid`.
///
/// # Examples
///
/// ```
/// use codebeamer_sync::webhooks::{
///     SignatureCheck, check_signature, compute_signature, format_signature_header,
/// };
///
/// let body = b"{}";
/// let header = format_signature_header(&compute_signature(body, b"k"));
///
/// let secret: &[u8] = b"k";
/// assert_eq!(check_signature(body, Some(header.as_str()), Some(secret)), SignatureCheck::Valid);
/// assert_eq!(check_signature(body, None, Some(secret)), SignatureCheck::Invalid);
/// assert_eq!(check_signature(body, None, None), SignatureCheck::Skipped);
/// ```
pub fn check_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: Option<&[u8]>,
) -> SignatureCheck {
    let Some(secret) = secret else {
        return SignatureCheck::Skipped;
    };

    match signature_header {
        Some(header) if verify_signature(payload, header, secret) => SignatureCheck::Valid,
        _ => SignatureCheck::Invalid,
    }
}
