//! HMAC-SHA512 webhook signature verification.
//!
//! The signature is computed over the raw, unparsed request body; parsing
//! happens only after the signature checks out.

use ring::hmac;

/// Computes the hex-encoded HMAC-SHA512 signature of `payload`.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA512, secret);
    hex::encode(hmac::sign(&key, payload).as_ref())
}

/// Verifies a hex-encoded signature in constant time. Malformed hex is a
/// mismatch, not an error.
pub fn verify(payload: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA512, secret);
    hmac::verify(&key, payload, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_secret";

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"event":"transaction.success","data":{"reference":"TKT-1"}}"#;
        let signature = sign(body, SECRET);

        assert!(verify(body, &signature, SECRET));
    }

    #[test]
    fn tampered_body_fails() {
        let body = br#"{"event":"transaction.success","data":{"reference":"TKT-1"}}"#;
        let signature = sign(body, SECRET);
        let tampered = br#"{"event":"transaction.success","data":{"reference":"TKT-2"}}"#;

        assert!(!verify(tampered, &signature, SECRET));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let signature = sign(body, SECRET);

        assert!(!verify(body, &signature, b"other_secret"));
    }

    #[test]
    fn malformed_hex_is_a_mismatch() {
        assert!(!verify(b"payload", "not-hex!", SECRET));
        assert!(!verify(b"payload", "", SECRET));
    }
}
