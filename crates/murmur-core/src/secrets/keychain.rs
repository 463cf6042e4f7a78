//! OS keychain backend.

use zeroize::Zeroizing;

use super::{KeyIdentifier, SecretStore};
use crate::crypto::SymmetricKey;
use crate::error::{MurmurError, Result};

const SERVICE: &str = "murmur";

/// Secret store backed by the platform keychain.
///
/// Keys are hex-encoded into the password slot of a keychain entry whose
/// account is `<scope>/<identifier>`. The scope ties every slot to one
/// journal, so deleting a journal's slots never touches another journal's.
pub struct KeychainSecretStore {
    scope: String,
}

impl KeychainSecretStore {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    fn entry(&self, identifier: &KeyIdentifier) -> Result<keyring::Entry> {
        let account = format!("{}/{}", self.scope, identifier);
        keyring::Entry::new(SERVICE, &account)
            .map_err(|e| MurmurError::Store(format!("Keychain entry failed: {}", e)))
    }
}

impl SecretStore for KeychainSecretStore {
    fn put(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<()> {
        // Delete-then-insert so a stale slot never survives a failed overwrite.
        self.delete(identifier)?;
        let encoded = Zeroizing::new(hex::encode(key.as_bytes()));
        self.entry(identifier)?
            .set_password(&encoded)
            .map_err(|e| MurmurError::Store(format!("Keychain write failed: {}", e)))
    }

    /// The keychain has no create-if-absent primitive. The slot is checked
    /// first and read back after writing, so a concurrent writer is only
    /// detected if it finished before the read-back.
    fn create(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<bool> {
        if self.get(identifier)?.is_some() {
            return Ok(false);
        }
        let encoded = Zeroizing::new(hex::encode(key.as_bytes()));
        self.entry(identifier)?
            .set_password(&encoded)
            .map_err(|e| MurmurError::Store(format!("Keychain write failed: {}", e)))?;
        Ok(self.get(identifier)?.as_ref() == Some(key))
    }

    fn get(&self, identifier: &KeyIdentifier) -> Result<Option<SymmetricKey>> {
        let encoded = match self.entry(identifier)?.get_password() {
            Ok(value) => Zeroizing::new(value),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(err) => return Err(MurmurError::Store(format!("Keychain read failed: {}", err))),
        };
        let bytes = Zeroizing::new(
            hex::decode(encoded.as_bytes())
                .map_err(|e| MurmurError::Store(format!("Keychain value is not hex: {}", e)))?,
        );
        SymmetricKey::from_slice(&bytes).map(Some)
    }

    fn delete(&self, identifier: &KeyIdentifier) -> Result<bool> {
        match self.entry(identifier)?.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(MurmurError::Store(format!("Keychain delete failed: {}", err))),
        }
    }
}
