//! PIN validation, hashing and verification.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{MurmurError, Result};

/// Minimum PIN length in characters.
pub const MIN_PIN_LENGTH: usize = 4;

/// Validate a PIN meets minimum requirements.
///
/// # Requirements
///
/// - Not empty or only whitespace
/// - At least `min_length` characters long
///
/// # Examples
///
/// ```
/// use murmur_core::crypto::validate_pin;
///
/// assert!(validate_pin("1234", 4).is_ok());
/// assert!(validate_pin("12", 4).is_err());
/// ```
pub fn validate_pin(pin: &str, min_length: usize) -> Result<()> {
    if pin.trim().is_empty() {
        return Err(MurmurError::InvalidInput("PIN cannot be empty".to_string()));
    }

    let length = pin.chars().count();
    if length < min_length {
        return Err(MurmurError::InvalidInput(format!(
            "PIN must be at least {} characters (got {})",
            min_length, length
        )));
    }

    Ok(())
}

/// Hash a PIN with its salt: hex(SHA-256(salt || pin)).
pub fn hash_pin(pin: &str, salt: &[u8]) -> String {
    hex::encode(pin_digest(pin, salt))
}

/// Check a PIN against a stored hash.
///
/// The digest comparison is constant-time. A malformed stored hash verifies
/// as `false` rather than erroring, so callers see a single "not authorized"
/// outcome.
pub fn verify_pin(pin: &str, hash: &str, salt: &[u8]) -> bool {
    let expected = match hex::decode(hash) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let actual = pin_digest(pin, salt);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn pin_digest(pin: &str, salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(pin.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"pin-salt-1234567";

    #[test]
    fn test_verify_correct_pin() {
        let hash = hash_pin("1234", SALT);
        assert!(verify_pin("1234", &hash, SALT));
    }

    #[test]
    fn test_verify_wrong_pin() {
        let hash = hash_pin("1234", SALT);
        assert!(!verify_pin("4321", &hash, SALT));
        assert!(!verify_pin("", &hash, SALT));
    }

    #[test]
    fn test_verify_wrong_salt() {
        let hash = hash_pin("1234", SALT);
        assert!(!verify_pin("1234", &hash, b"other-salt-12345"));
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        assert!(!verify_pin("1234", "not-hex", SALT));
        assert!(!verify_pin("1234", "abcd", SALT));
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hash_pin("1234", SALT), hash_pin("1234", b"other-salt-12345"));
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("1234", MIN_PIN_LENGTH).is_ok());
        assert!(validate_pin("correct horse", MIN_PIN_LENGTH).is_ok());
        assert!(validate_pin("   ", MIN_PIN_LENGTH).is_err());
        let err = validate_pin("123", MIN_PIN_LENGTH).unwrap_err();
        assert!(err.to_string().contains("at least 4 characters"));
    }
}
