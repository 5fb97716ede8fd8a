//! Slack request signature verification (v0 signing scheme).
//!
//! The base string is `v0:{timestamp}:{raw_body}` over the exact bytes Slack
//! transmitted; any re-serialization of the body invalidates the signature.
//! No timestamp-skew check is performed, so an old timestamp with a valid
//! signature is accepted. That matches upstream behavior and is a known
//! hardening gap.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the `v0=`-prefixed hex signature for a timestamp and raw body.
pub fn sign(secret: &str, timestamp: &str, raw_body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body.as_bytes());
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a Slack signature against the exact request bytes.
///
/// Fails closed: a missing header, malformed signature, or mismatch all
/// return `false`. The comparison is constant-time.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    raw_body: &str,
    signature: Option<&str>,
) -> bool {
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };

    let Some(supplied_hex) = signature.strip_prefix("v0=") else {
        return false;
    };
    let Ok(supplied) = hex::decode(supplied_hex) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body.as_bytes());
    mac.verify_slice(&supplied).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const TIMESTAMP: &str = "1531420618";
    const BODY: &str = r#"{"type":"event_callback","team_id":"T123"}"#;

    #[test]
    fn test_sign_then_verify_round_trip() {
        let sig = sign(SECRET, TIMESTAMP, BODY);
        assert!(sig.starts_with("v0="));
        assert!(verify(SECRET, Some(TIMESTAMP), BODY, Some(&sig)));
    }

    #[test]
    fn test_mutated_body_fails() {
        let sig = sign(SECRET, TIMESTAMP, BODY);
        let mut mutated = BODY.to_string();
        mutated.replace_range(0..1, "[");
        assert!(!verify(SECRET, Some(TIMESTAMP), &mutated, Some(&sig)));
    }

    #[test]
    fn test_mutated_timestamp_fails() {
        let sig = sign(SECRET, TIMESTAMP, BODY);
        assert!(!verify(SECRET, Some("1531420619"), BODY, Some(&sig)));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sig = sign(SECRET, TIMESTAMP, BODY);
        assert!(!verify("other-secret", Some(TIMESTAMP), BODY, Some(&sig)));
    }

    #[test]
    fn test_missing_headers_fail_closed() {
        let sig = sign(SECRET, TIMESTAMP, BODY);
        assert!(!verify(SECRET, None, BODY, Some(&sig)));
        assert!(!verify(SECRET, Some(TIMESTAMP), BODY, None));
    }

    #[test]
    fn test_malformed_signature_fails_closed() {
        assert!(!verify(SECRET, Some(TIMESTAMP), BODY, Some("garbage")));
        assert!(!verify(SECRET, Some(TIMESTAMP), BODY, Some("v0=nothex!!")));
        assert!(!verify(SECRET, Some(TIMESTAMP), BODY, Some("v0=")));
    }

    #[test]
    fn test_single_byte_flip_in_signature_fails() {
        let sig = sign(SECRET, TIMESTAMP, BODY);
        let mut bytes = sig.into_bytes();
        let last = bytes.last_mut().unwrap();
        *last = if *last == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(bytes).unwrap();
        assert!(!verify(SECRET, Some(TIMESTAMP), BODY, Some(&flipped)));
    }
}
