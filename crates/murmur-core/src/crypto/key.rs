//! Symmetric keys and PIN-based key derivation.
//!
//! Tag keys are derived from a PIN with PBKDF2-HMAC-SHA256. The root key and
//! fresh tag keys are drawn from the OS random source.

use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{MurmurError, Result};

/// PBKDF2 iteration count. Fixed so the same (pin, salt) always derives the same key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Length of a symmetric key in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

/// Length of a PIN salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// A 256-bit symmetric key.
///
/// Key bytes live in a `SecretBox` and are zeroized when the last owner drops
/// the key. There is deliberately no `Serialize` impl; the only place key
/// bytes leave memory is the secret store.
pub struct SymmetricKey {
    bytes: SecretBox<[u8; KEY_LENGTH]>,
}

impl SymmetricKey {
    /// Wrap raw key bytes.
    ///
    /// # Security
    ///
    /// The caller is responsible for ensuring the bytes come from a secure source.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self {
            bytes: SecretBox::new(Box::new(bytes)),
        }
    }

    /// Build a key from a byte slice read back from a secret store.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            MurmurError::Store(format!(
                "Stored key has wrong length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(array))
    }

    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value. Use only for immediate encryption operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        self.bytes.expose_secret()
    }
}

impl Clone for SymmetricKey {
    fn clone(&self) -> Self {
        Self::from_bytes(*self.as_bytes())
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Fill a buffer from the OS random source.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| MurmurError::Crypto(format!("Random source failed: {}", e)))?;
    Ok(bytes)
}

/// Generate a fresh random 256-bit key.
pub fn generate_random_key() -> Result<SymmetricKey> {
    Ok(SymmetricKey::from_bytes(random_bytes::<KEY_LENGTH>()?))
}

/// Generate a fresh random PIN salt.
pub fn generate_salt() -> Result<[u8; SALT_LENGTH]> {
    random_bytes::<SALT_LENGTH>()
}

/// Derive a key from a PIN using PBKDF2-HMAC-SHA256.
///
/// # Security
///
/// - Same PIN + salt always produces the same key (deterministic)
/// - Different salt produces a different key
/// - Invalid input is a hard error; there is no random-key fallback
///
/// # Examples
///
/// ```
/// use murmur_core::crypto::derive_key;
///
/// let salt = b"unique-salt-16by";
/// let key = derive_key("1234", salt).unwrap();
/// assert_eq!(key, derive_key("1234", salt).unwrap());
/// ```
pub fn derive_key(pin: &str, salt: &[u8]) -> Result<SymmetricKey> {
    if pin.is_empty() {
        return Err(MurmurError::InvalidInput("PIN cannot be empty".to_string()));
    }

    if salt.len() < SALT_LENGTH {
        return Err(MurmurError::InvalidInput(format!(
            "Salt must be at least {} bytes",
            SALT_LENGTH
        )));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key_bytes);
    let key = SymmetricKey::from_bytes(key_bytes);
    zeroize::Zeroize::zeroize(&mut key_bytes);
    Ok(key)
}
