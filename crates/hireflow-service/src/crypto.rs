//! Webhook signature verification.
//!
//! Paddle signs every notification with a `Paddle-Signature` header of the
//! form `ts=<unix seconds>;h1=<hex hmac>`, where the HMAC-SHA256 is computed
//! over `"{ts}:{raw body}"` with the endpoint's secret key.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Largest accepted distance, in seconds, between `ts` and the receiver's clock.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Why a webhook signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The header is missing `ts` or `h1`.
    #[error("malformed signature header")]
    Malformed,

    /// No `h1` value matches the body.
    #[error("signature mismatch")]
    Mismatch,

    /// `ts` is outside [`SIGNATURE_TOLERANCE_SECS`] of the current time.
    #[error("signature timestamp outside tolerance")]
    Expired,
}

/// Compute HMAC-SHA256 over `message` and return it hex-encoded.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> String {
    // `new_from_slice` only rejects keys for fixed-size MACs; HMAC takes any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a `Paddle-Signature` header against the raw request body.
///
/// Paddle may send several `h1` values while a secret is being rotated; any
/// match is accepted. `now` is the receiver's clock in unix seconds.
///
/// # Errors
///
/// [`SignatureError::Malformed`] if the header lacks a timestamp or a
/// signature, [`SignatureError::Mismatch`] if no signature matches,
/// [`SignatureError::Expired`] if a matching signature is too old or too far
/// in the future.
pub fn verify_paddle_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(';') {
        match part.trim().split_once('=') {
            Some(("ts", value)) if !value.is_empty() => timestamp = Some(value),
            Some(("h1", value)) if !value.is_empty() => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b':');
    signed.extend_from_slice(body);
    let expected = hmac_sha256_hex(secret, &signed);

    if !signatures
        .iter()
        .any(|candidate| constant_time_eq(candidate, &expected))
    {
        return Err(SignatureError::Mismatch);
    }

    let signed_at: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Build a `Paddle-Signature` header for `body`. Used by tests and local tooling.
#[must_use]
pub fn sign_paddle_payload(timestamp: i64, body: &[u8], secret: &str) -> String {
    let mut signed = format!("{timestamp}:").into_bytes();
    signed.extend_from_slice(body);
    format!("ts={timestamp};h1={}", hmac_sha256_hex(secret, &signed))
}
