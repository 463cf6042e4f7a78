//! Persistent secret storage.
//!
//! A `SecretStore` maps opaque `KeyIdentifier`s to 256-bit keys. One slot is
//! reserved for the root (base) key; every encrypted tag owns a
//! `tag:<tag-id>` slot for as long as the tag stays encrypted.
//!
//! Backends:
//! - `KeychainSecretStore`: the OS keychain (preferred)
//! - `KeyfileSecretStore`: owner-only files in a directory (degraded tier)
//! - `MemorySecretStore`: process memory, for tests and embedders
//!
//! Absence of a key is not an error; `get` returns `Ok(None)` and the caller
//! decides whether that means "not yet provisioned" or "locked".

pub mod keyfile;
pub mod keychain;
pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{generate_random_key, SymmetricKey};
use crate::error::{MurmurError, Result};

pub use self::keyfile::KeyfileSecretStore;
pub use self::keychain::KeychainSecretStore;
pub use self::memory::MemorySecretStore;

const ROOT_IDENTIFIER: &str = "root";
const TAG_PREFIX: &str = "tag:";

/// Name of a slot in a secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyIdentifier(String);

impl KeyIdentifier {
    /// The reserved slot holding the root (base) key.
    pub fn root() -> Self {
        Self(ROOT_IDENTIFIER.to_string())
    }

    /// The slot holding an encrypted tag's key. Stable for the lifetime of the tag.
    pub fn for_tag(tag_id: &Uuid) -> Self {
        Self(format!("{}{}", TAG_PREFIX, tag_id))
    }

    /// Restore an identifier read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_IDENTIFIER
    }

    /// The tag this slot belongs to, if it is a tag slot.
    pub fn tag_id(&self) -> Option<Uuid> {
        self.0
            .strip_prefix(TAG_PREFIX)
            .and_then(|value| Uuid::parse_str(value).ok())
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret store interface.
///
/// Implementations must be safe to share across threads and must make `put`
/// idempotent: writing an identifier replaces whatever was stored before.
pub trait SecretStore: Send + Sync {
    /// Store `key` under `identifier`, replacing any previous value.
    fn put(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<()>;

    /// Store `key` under `identifier` only if the slot is empty.
    ///
    /// Returns `false` and leaves the slot alone if it already holds a key.
    fn create(&self, identifier: &KeyIdentifier, key: &SymmetricKey) -> Result<bool>;

    /// Fetch the key stored under `identifier`, if any.
    fn get(&self, identifier: &KeyIdentifier) -> Result<Option<SymmetricKey>>;

    /// Remove the slot. Returns `true` if something was deleted.
    fn delete(&self, identifier: &KeyIdentifier) -> Result<bool>;
}

/// `put`, retried once before the failure is surfaced.
pub fn put_with_retry(
    store: &dyn SecretStore,
    identifier: &KeyIdentifier,
    key: &SymmetricKey,
) -> Result<()> {
    match store.put(identifier, key) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::warn!(identifier = %identifier, error = %err, "secret store write failed, retrying once");
            store.put(identifier, key)
        }
    }
}

/// The root key, generated and stored if the slot is still empty.
///
/// When two callers race to provision, the slot keeps whichever key was
/// created first and both return it.
pub fn provision_root_key(store: &dyn SecretStore) -> Result<SymmetricKey> {
    let identifier = KeyIdentifier::root();
    if let Some(key) = get_with_retry(store, &identifier)? {
        return Ok(key);
    }

    let key = generate_random_key()?;
    let created = match store.create(&identifier, &key) {
        Ok(created) => created,
        Err(err) => {
            tracing::warn!(error = %err, "root key creation failed, retrying once");
            store.create(&identifier, &key)?
        }
    };
    if created {
        tracing::info!("root key provisioned");
        return Ok(key);
    }

    tracing::debug!("root key was provisioned concurrently, using the stored one");
    get_with_retry(store, &identifier)?
        .ok_or_else(|| MurmurError::Store("Root key vanished while provisioning".to_string()))
}

/// `get`, retried once before the failure is surfaced.
pub fn get_with_retry(
    store: &dyn SecretStore,
    identifier: &KeyIdentifier,
) -> Result<Option<SymmetricKey>> {
    match store.get(identifier) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(identifier = %identifier, error = %err, "secret store read failed, retrying once");
            store.get(identifier)
        }
    }
}
