//! HMAC-SHA256 payload signing.
//!
//! The agent signs the raw batch body before compression; the server
//! verifies the same bytes after decompression. Digests travel
//! hex-encoded in the `HashSHA256` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-lowercase HMAC-SHA256 digest of `payload` under `key`.
///
/// # Examples
///
/// ```rust
/// use metric_relay_core::compute_signature;
///
/// let sig = compute_signature(b"[]", "secret");
/// assert_eq!(sig.len(), 64);
/// assert_eq!(sig, compute_signature(b"[]", "secret"));
/// ```
pub fn compute_signature(payload: &[u8], key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex digest against `payload` under `key`.
///
/// Returns `false` for any digest that is not valid hex or does not
/// match; the comparison of the decoded bytes is constant-time. A
/// malformed digest is a mismatch, never an error, so callers have a
/// single rejection path.
pub fn verify_signature(payload: &[u8], key: &str, hex_digest: &str) -> bool {
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&digest).is_ok()
}

#[cfg(test)]
#[path = "sign_tests.rs"]
mod tests;
