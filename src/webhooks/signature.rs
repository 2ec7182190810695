//! Webhook signature verification using HMAC-SHA256.
//!
//! The upstream signs each delivery body with a shared secret and sends the
//! result in the `X-Hub-Signature-256` header as `sha256=<hex>`. Verification
//! runs before any parsing or storage work, and the comparison is constant
//! time via the HMAC library.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parses a `sha256=<hex>` header value into raw signature bytes.
///
/// Returns `None` for malformed headers (missing prefix, wrong algorithm,
/// invalid hex). Never panics.
fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of `payload` under `secret`.
///
/// Production code only verifies; this is exposed for tests and tooling that
/// need to construct valid deliveries.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats raw signature bytes as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a delivery body against its signature header and the shared
/// secret. Returns `false` for any malformed header.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);

    // Constant-time comparison via the HMAC library.
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_verifies() {
        let payload = b"{\"ref\":\"refs/heads/feat\"}";
        let secret = b"shared-secret";

        let header = format_signature_header(&compute_signature(payload, secret));
        assert!(verify_signature(payload, &header, secret));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"payload";
        let header = format_signature_header(&compute_signature(payload, b"right"));
        assert!(!verify_signature(payload, &header, b"wrong"));
    }

    #[test]
    fn tampered_payload_fails() {
        let header = format_signature_header(&compute_signature(b"original", b"secret"));
        assert!(!verify_signature(b"tampered", &header, b"secret"));
    }

    #[test]
    fn malformed_headers_fail_without_panicking() {
        let payload = b"body";
        let secret = b"secret";
        for header in ["", "sha256=", "sha256=zzzz", "sha1=abcd", "not-a-header"] {
            assert!(!verify_signature(payload, header, secret), "header: {header}");
        }
        // Odd-length hex is invalid.
        assert!(!verify_signature(payload, "sha256=abc", secret));
    }

    #[test]
    fn empty_secret_still_roundtrips() {
        // Dev-mode callers skip verification entirely, but an empty secret is
        // still a valid HMAC key.
        let payload = b"body";
        let header = format_signature_header(&compute_signature(payload, b""));
        assert!(verify_signature(payload, &header, b""));
    }

    proptest! {
        /// Sign-then-verify always succeeds with the same secret.
        #[test]
        fn prop_sign_verify_roundtrip(payload: Vec<u8>, secret: Vec<u8>) {
            let header = format_signature_header(&compute_signature(&payload, &secret));
            prop_assert!(verify_signature(&payload, &header, &secret));
        }

        /// A different secret never verifies.
        #[test]
        fn prop_wrong_secret_fails(payload: Vec<u8>, secret1: Vec<u8>, secret2: Vec<u8>) {
            prop_assume!(secret1 != secret2);
            let header = format_signature_header(&compute_signature(&payload, &secret1));
            prop_assert!(!verify_signature(&payload, &header, &secret2));
        }

        /// Arbitrary header strings never panic the verifier.
        #[test]
        fn prop_malformed_header_no_panic(header: String, payload: Vec<u8>, secret: Vec<u8>) {
            let _ = verify_signature(&payload, &header, &secret);
        }
    }
}
