//! In-process secret store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use zeroize::Zeroizing;

use super::{KeyIdentifier, SecretStore};
use crate::crypto::key::KEY_LENGTH;
use crate::crypto::SymmetricKey;
use crate::error::{MurmurError, Result};

/// Secret store held in process memory.
///
/// Nothing survives the process. Useful for tests and for hosts that persist
/// secrets themselves. Writes can be made to fail on demand to exercise the
/// store-failure path.
#[derive(Default)]
pub struct MemorySecretStore {
    slots: Mutex<HashMap<KeyIdentifier, Zeroizing<[u8; KEY_LENGTH]>>>,
    failing_writes: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes (`put` or `create`) fail with `MurmurError::Store`.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.lock_slots().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_slots(&self) -> Result<MutexGuard<'_, HashMap<KeyIdentifier, Zeroizing<[u8; KEY_LENGTH]>>>> {
        self.slots
            .lock()
            .map_err(|_| MurmurError::Store("Memory store poisoned".to_string()))
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl SecretStore for MemorySecretStore {
    fn put(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<()> {
        if self.take_write_failure() {
            return Err(MurmurError::Store(format!(
                "Simulated write failure for {}",
                identifier
            )));
        }
        let mut slots = self.lock_slots()?;
        slots.remove(identifier);
        slots.insert(identifier.clone(), Zeroizing::new(*key.as_bytes()));
        Ok(())
    }

    fn create(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<bool> {
        if self.take_write_failure() {
            return Err(MurmurError::Store(format!(
                "Simulated write failure for {}",
                identifier
            )));
        }
        let mut slots = self.lock_slots()?;
        if slots.contains_key(identifier) {
            return Ok(false);
        }
        slots.insert(identifier.clone(), Zeroizing::new(*key.as_bytes()));
        Ok(true)
    }

    fn get(&self, identifier: &KeyIdentifier) -> Result<Option<SymmetricKey>> {
        let slots = self.lock_slots()?;
        Ok(slots
            .get(identifier)
            .map(|bytes| SymmetricKey::from_bytes(**bytes)))
    }

    fn delete(&self, identifier: &KeyIdentifier) -> Result<bool> {
        let mut slots = self.lock_slots()?;
        Ok(slots.remove(identifier).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_random_key;

    #[test]
    fn test_put_get_delete() {
        let store = MemorySecretStore::new();
        let id = KeyIdentifier::root();
        let key = generate_random_key().unwrap();

        assert_eq!(store.get(&id).unwrap(), None);
        store.put(&id, &key).unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(key));
        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let store = MemorySecretStore::new();
        let id = KeyIdentifier::root();
        let first = generate_random_key().unwrap();
        let second = generate_random_key().unwrap();

        store.put(&id, &first).unwrap();
        store.put(&id, &second).unwrap();

        assert_eq!(store.get(&id).unwrap(), Some(second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_write_failures_are_consumed() {
        let store = MemorySecretStore::new();
        let key = generate_random_key().unwrap();
        store.fail_next_writes(1);

        assert!(store.put(&KeyIdentifier::root(), &key).is_err());
        assert!(store.put(&KeyIdentifier::root(), &key).is_ok());
    }
}
