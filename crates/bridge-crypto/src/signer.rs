//! # Message Signer
//!
//! HMAC-SHA256 signing and verification for device payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `data` with the device key. Returns the lowercase hex digest.
#[must_use]
pub fn sign(key: &str, data: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature for `data`.
///
/// Uses constant-time comparison; a direct string equality would leak the
/// digest through timing.
#[must_use]
pub fn verify(key: &str, data: &str, signature: &str) -> bool {
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let signature = sign("DK_test_key", "hello world");
        assert!(verify("DK_test_key", "hello world", &signature));
    }

    #[test]
    fn test_verify_wrong_key() {
        let signature = sign("DK_test_key", "hello world");
        assert!(!verify("DK_other_key", "hello world", &signature));
    }

    #[test]
    fn test_verify_tampered_data() {
        let signature = sign("DK_test_key", "hello world");
        assert!(!verify("DK_test_key", "hello World", &signature));
    }

    #[test]
    fn test_verify_single_bit_flip_in_signature() {
        let signature = sign("DK_test_key", "hello world");
        let mut bytes = hex::decode(&signature).unwrap();
        bytes[0] ^= 0x01;
        assert!(!verify("DK_test_key", "hello world", &hex::encode(bytes)));
    }

    #[test]
    fn test_verify_rejects_non_hex() {
        assert!(!verify("DK_test_key", "hello", "not-hex!"));
    }

    #[test]
    fn test_signature_is_hex_sha256_length() {
        let signature = sign("k", "d");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
