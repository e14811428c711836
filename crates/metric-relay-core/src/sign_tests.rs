//! Tests for payload signing

use super::*;

#[test]
fn test_signature_is_deterministic() {
    let payload = br#"[{"id":"c1","type":"counter","delta":5}]"#;

    let first = compute_signature(payload, "secret");
    let second = compute_signature(payload, "secret");

    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn test_known_digest() {
    // RFC 4231-style fixed vector: HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
    let sig = compute_signature(b"The quick brown fox jumps over the lazy dog", "key");

    assert_eq!(
        sig,
        "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn test_verify_accepts_matching_digest() {
    let payload = b"payload bytes";
    let sig = compute_signature(payload, "shared-key");

    assert!(verify_signature(payload, "shared-key", &sig));
}

#[test]
fn test_verify_rejects_wrong_key() {
    let payload = b"payload bytes";
    let sig = compute_signature(payload, "shared-key");

    assert!(!verify_signature(payload, "other-key", &sig));
}

#[test]
fn test_verify_rejects_tampered_payload() {
    let sig = compute_signature(b"original", "shared-key");

    assert!(!verify_signature(b"tampered", "shared-key", &sig));
}

#[test]
fn test_verify_rejects_non_hex_digest() {
    assert!(!verify_signature(b"payload", "key", "not-a-hex-digest"));
}

#[test]
fn test_verify_rejects_truncated_digest() {
    let sig = compute_signature(b"payload", "key");

    assert!(!verify_signature(b"payload", "key", &sig[..32]));
}
