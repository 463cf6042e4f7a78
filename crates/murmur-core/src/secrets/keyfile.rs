//! Directory-of-keyfiles backend.
//!
//! Each identifier maps to one owner-only file holding the raw key bytes.
//! This trades the keychain's OS protection for portability; the directory
//! should live inside the application's data directory so a full data reset
//! removes every secret.

use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::{KeyIdentifier, SecretStore};
use crate::crypto::SymmetricKey;
use crate::error::{MurmurError, Result};
use crate::fs::{create_private_dir, write_atomic_private, write_new_private};

/// Secret store keeping one file per identifier under `dir`.
pub struct KeyfileSecretStore {
    dir: PathBuf,
}

impl KeyfileSecretStore {
    /// Open (and create if needed) a keyfile directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        create_private_dir(&dir).map_err(|e| {
            MurmurError::Store(format!(
                "Failed to create keyfile directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, identifier: &KeyIdentifier) -> PathBuf {
        let filename: String = identifier
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.key", filename))
    }
}

impl SecretStore for KeyfileSecretStore {
    fn put(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<()> {
        let path = self.slot_path(identifier);
        write_atomic_private(&path, key.as_bytes()).map_err(|e| {
            MurmurError::Store(format!("Failed to write keyfile {}: {}", path.display(), e))
        })
    }

    fn create(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<bool> {
        let path = self.slot_path(identifier);
        write_new_private(&path, key.as_bytes()).map_err(|e| {
            MurmurError::Store(format!("Failed to create keyfile {}: {}", path.display(), e))
        })
    }

    fn get(&self, identifier: &KeyIdentifier) -> Result<Option<SymmetricKey>> {
        let path = self.slot_path(identifier);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                SymmetricKey::from_slice(&bytes).map(Some)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(MurmurError::Store(format!(
                "Failed to read keyfile {}: {}",
                path.display(),
                err
            ))),
        }
    }

    fn delete(&self, identifier: &KeyIdentifier) -> Result<bool> {
        let path = self.slot_path(identifier);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(MurmurError::Store(format!(
                "Failed to delete keyfile {}: {}",
                path.display(),
                err
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_random_key;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn test_keys_survive_reopen() {
        let dir = tempdir().unwrap();
        let id = KeyIdentifier::for_tag(&Uuid::new_v4());
        let key = generate_random_key().unwrap();

        KeyfileSecretStore::open(dir.path().join("keys"))
            .unwrap()
            .put(&id, &key)
            .unwrap();

        let reopened = KeyfileSecretStore::open(dir.path().join("keys")).unwrap();
        assert_eq!(reopened.get(&id).unwrap(), Some(key));
    }

    #[test]
    fn test_create_loses_to_existing_keyfile() {
        let dir = tempdir().unwrap();
        let first = KeyfileSecretStore::open(dir.path()).unwrap();
        let second = KeyfileSecretStore::open(dir.path()).unwrap();
        let winner = generate_random_key().unwrap();
        let loser = generate_random_key().unwrap();

        assert!(first.create(&KeyIdentifier::root(), &winner).unwrap());
        assert!(!second.create(&KeyIdentifier::root(), &loser).unwrap());
        assert_eq!(second.get(&KeyIdentifier::root()).unwrap(), Some(winner));

        // Only the slot itself is left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_slot_is_none() {
        let dir = tempdir().unwrap();
        let store = KeyfileSecretStore::open(dir.path()).unwrap();

        assert_eq!(store.get(&KeyIdentifier::root()).unwrap(), None);
        assert!(!store.delete(&KeyIdentifier::root()).unwrap());
    }

    #[test]
    fn test_corrupt_keyfile_is_store_error() {
        let dir = tempdir().unwrap();
        let store = KeyfileSecretStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("root.key"), b"short").unwrap();

        assert!(matches!(
            store.get(&KeyIdentifier::root()),
            Err(MurmurError::Store(_))
        ));
    }

    #[test]
    fn test_slot_filenames_are_sanitized() {
        let dir = tempdir().unwrap();
        let store = KeyfileSecretStore::open(dir.path()).unwrap();
        let tag_id = Uuid::new_v4();

        let path = store.slot_path(&KeyIdentifier::for_tag(&tag_id));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("tag_{}.key", tag_id)
        );
    }
}
