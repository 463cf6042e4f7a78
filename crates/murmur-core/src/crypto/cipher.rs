//! AES-256-GCM sealing.
//!
//! Sealed blobs use the combined format `nonce (12) || ciphertext || tag (16)`,
//! so a blob carries everything `open` needs besides the key.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::key::{random_bytes, SymmetricKey};
use crate::error::{MurmurError, Result};

/// 96-bit nonce, the AES-GCM standard.
pub const NONCE_LENGTH: usize = 12;

/// GCM authentication tag length.
pub const TAG_LENGTH: usize = 16;

/// Encrypt `plaintext`, prepending a fresh random nonce.
pub fn seal(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| MurmurError::Crypto(format!("Invalid key: {}", e)))?;

    let nonce_bytes = random_bytes::<NONCE_LENGTH>()?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| MurmurError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a sealed blob.
///
/// Fails with `MurmurError::Decryption` on truncated input, tag mismatch or
/// wrong key; no partial plaintext is ever returned.
pub fn open(sealed: &[u8], key: &SymmetricKey) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LENGTH + TAG_LENGTH {
        return Err(MurmurError::Decryption(format!(
            "Sealed data is truncated ({} bytes)",
            sealed.len()
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| MurmurError::Crypto(format!("Invalid key: {}", e)))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| MurmurError::Decryption("Authentication failed".to_string()))?;

    Ok(Zeroizing::new(plaintext))
}

/// Seal a UTF-8 string.
pub fn seal_string(plaintext: &str, key: &SymmetricKey) -> Result<Vec<u8>> {
    seal(plaintext.as_bytes(), key)
}

/// Open a sealed blob and decode it as UTF-8.
///
/// A successful open followed by a decode failure signals corruption and
/// surfaces as `MurmurError::Encoding`.
pub fn open_string(sealed: &[u8], key: &SymmetricKey) -> Result<String> {
    let bytes = open(sealed, key)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| MurmurError::Encoding(e.to_string()))
}

/// Seal on the blocking pool so large payloads (audio) stay off the caller's task.
pub async fn seal_detached(plaintext: Vec<u8>, key: Arc<SymmetricKey>) -> Result<Vec<u8>> {
    let plaintext = Zeroizing::new(plaintext);
    tokio::task::spawn_blocking(move || seal(&plaintext, &key))
        .await
        .map_err(|e| MurmurError::Crypto(format!("Sealing task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::generate_random_key;

    #[test]
    fn test_seal_open_round_trip() {
        let key = generate_random_key().unwrap();
        let plaintext = b"Hello, World! This is secret data.";

        let sealed = seal(plaintext, &key).unwrap();
        let opened = open(&sealed, &key).unwrap();

        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_sealed_layout() {
        let key = generate_random_key().unwrap();
        let sealed = seal(b"abc", &key).unwrap();
        assert_eq!(sealed.len(), NONCE_LENGTH + 3 + TAG_LENGTH);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_random_key().unwrap();
        let key2 = generate_random_key().unwrap();

        let sealed = seal(b"secret data", &key1).unwrap();
        let result = open(&sealed, &key2);

        assert!(matches!(result, Err(MurmurError::Decryption(_))));
    }

    #[test]
    fn test_tampered_data_fails() {
        let key = generate_random_key().unwrap();
        let mut sealed = seal(b"secret data", &key).unwrap();

        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert!(matches!(open(&sealed, &key), Err(MurmurError::Decryption(_))));
    }

    #[test]
    fn test_truncated_data_fails() {
        let key = generate_random_key().unwrap();
        let sealed = seal(b"secret data", &key).unwrap();

        assert!(matches!(open(&sealed[..10], &key), Err(MurmurError::Decryption(_))));
        assert!(matches!(
            open(&sealed[..sealed.len() - 1], &key),
            Err(MurmurError::Decryption(_))
        ));
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = generate_random_key().unwrap();
        let first = seal(b"same text", &key).unwrap();
        let second = seal(b"same text", &key).unwrap();

        assert_ne!(first[..NONCE_LENGTH], second[..NONCE_LENGTH]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = generate_random_key().unwrap();
        let sealed = seal(b"", &key).unwrap();
        assert!(open(&sealed, &key).unwrap().is_empty());
    }

    #[test]
    fn test_string_round_trip() {
        let key = generate_random_key().unwrap();
        let sealed = seal_string("hello ✓", &key).unwrap();
        assert_eq!(open_string(&sealed, &key).unwrap(), "hello ✓");
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let key = generate_random_key().unwrap();
        let sealed = seal(&[0xff, 0xfe, 0xfd], &key).unwrap();

        assert!(matches!(
            open_string(&sealed, &key),
            Err(MurmurError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_seal_detached_round_trip() {
        let key = Arc::new(generate_random_key().unwrap());
        let payload = vec![0x42u8; 256 * 1024];

        let sealed = seal_detached(payload.clone(), Arc::clone(&key)).await.unwrap();
        assert_eq!(open(&sealed, &key).unwrap().as_slice(), payload.as_slice());
    }
}
