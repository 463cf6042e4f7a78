//! Tag credential model.
//!
//! An encrypted tag carries a `TagCredential`: a salted PIN hash, the salt,
//! and the identifier of the secret store slot holding the tag key. The key
//! itself is derived from the PIN and salt, so the same PIN always yields
//! the same key for a given credential.

use std::sync::Arc;

use uuid::Uuid;

use crate::crypto::{derive_key, generate_salt, hash_pin, validate_pin, verify_pin};
use crate::error::{MurmurError, Result};
use crate::secrets::{put_with_retry, KeyIdentifier, SecretStore};
use crate::storage::{StorageEngine, Tag, TagCredential};

/// Check `pin` against a tag's credential. Always `false` for unencrypted tags.
pub fn verify_tag_pin(tag: &Tag, pin: &str) -> bool {
    tag.credential
        .as_ref()
        .map(|credential| verify_pin(pin, &credential.pin_hash, &credential.pin_salt))
        .unwrap_or(false)
}

/// Creates and destroys tag credentials.
pub struct TagCredentials {
    storage: Arc<dyn StorageEngine>,
    secrets: Arc<dyn SecretStore>,
    min_pin_length: usize,
}

impl TagCredentials {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        secrets: Arc<dyn SecretStore>,
        min_pin_length: usize,
    ) -> Self {
        Self {
            storage,
            secrets,
            min_pin_length,
        }
    }

    /// Make a tag encrypted under `pin`.
    ///
    /// Generates a fresh salt, stores the derived key in the secret store and
    /// then persists the credential. If persisting fails the secret store
    /// slot is removed again.
    ///
    /// # Errors
    ///
    /// - `MurmurError::TagNotFound` if the tag does not exist
    /// - `MurmurError::Validation` if the tag is already encrypted
    /// - `MurmurError::InvalidInput` if the PIN is too short
    /// - `MurmurError::Store` if the key cannot be stored
    pub fn set_pin(&self, tag_id: &Uuid, pin: &str) -> Result<Tag> {
        let mut tag = self
            .storage
            .get_tag(tag_id)?
            .ok_or_else(|| MurmurError::TagNotFound(tag_id.to_string()))?;
        if tag.is_encrypted() {
            return Err(MurmurError::Validation(format!(
                "Tag '{}' is already encrypted; remove its encryption before setting a new PIN",
                tag.name
            )));
        }
        validate_pin(pin, self.min_pin_length)?;

        let salt = generate_salt()?.to_vec();
        let key = derive_key(pin, &salt)?;
        let credential = TagCredential {
            pin_hash: hash_pin(pin, &salt),
            pin_salt: salt,
            key_identifier: KeyIdentifier::for_tag(&tag.id),
        };

        put_with_retry(self.secrets.as_ref(), &credential.key_identifier, &key)?;
        if let Err(err) = self
            .storage
            .update_tag_credential(&tag.id, Some(&credential))
        {
            if let Err(cleanup) = self.secrets.delete(&credential.key_identifier) {
                tracing::warn!(
                    tag_id = %tag.id,
                    error = %cleanup,
                    "failed to remove tag key after credential write failed"
                );
            }
            return Err(err);
        }

        tracing::info!(tag_id = %tag.id, "tag encryption enabled");
        tag.credential = Some(credential);
        Ok(tag)
    }

    /// Check `pin` against the stored credential of a tag.
    pub fn verify_pin(&self, tag_id: &Uuid, pin: &str) -> Result<bool> {
        let tag = self
            .storage
            .get_tag(tag_id)?
            .ok_or_else(|| MurmurError::TagNotFound(tag_id.to_string()))?;
        Ok(verify_tag_pin(&tag, pin))
    }

    /// Delete the tag key and clear the credential.
    ///
    /// Destructive: ciphertext sealed under this tag's key can no longer be
    /// opened afterwards. Callers that want to keep the content re-protect it
    /// first (see `Journal::remove_tag_encryption`). Clearing a tag that is
    /// not encrypted is a no-op.
    pub fn clear_encryption(&self, tag_id: &Uuid) -> Result<Tag> {
        let mut tag = self
            .storage
            .get_tag(tag_id)?
            .ok_or_else(|| MurmurError::TagNotFound(tag_id.to_string()))?;
        let Some(credential) = tag.credential.take() else {
            return Ok(tag);
        };

        self.secrets.delete(&credential.key_identifier)?;
        self.storage.update_tag_credential(&tag.id, None)?;

        tracing::warn!(
            tag_id = %tag.id,
            identifier = %credential.key_identifier,
            "tag key destroyed; content sealed under it is no longer readable"
        );
        Ok(tag)
    }
}
