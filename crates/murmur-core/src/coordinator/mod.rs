//! Field-level encryption decisions.
//!
//! The `EncryptionCoordinator` is the only component that turns plaintext
//! into ciphertext and back. For every write it decides which key governs
//! the entry:
//!
//! 1. the first encrypted tag in assignment order, else
//! 2. the root key if the entry opted into base encryption, else
//! 3. nothing: the entry is stored unprotected.
//!
//! Base and tag protection are mutually exclusive per field. A governing
//! key that is not available never fails a write; the plaintext is kept and
//! flagged `deferred` so a later reconcile can seal it. Ciphertext that can
//! no longer be opened is reported per field and left in place.

mod outcome;

pub use outcome::{EncryptionDomain, ReconcileReport, Reconciled, Revealed, WriteOutcome};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use zeroize::Zeroizing;

use crate::crypto::{open, seal, SymmetricKey};
use crate::error::{MurmurError, Result};
use crate::secrets::{provision_root_key, KeyIdentifier, SecretStore};
use crate::session::AccessSessionManager;
use crate::storage::{Entry, FieldName, Tag};

/// Tag key slots whose key was destroyed.
///
/// Ciphertext still naming one of these slots can never be opened again, so
/// it is neither pending nor retried.
#[derive(Debug, Clone, Default)]
pub struct RetiredSlots {
    slots: HashSet<KeyIdentifier>,
}

impl RetiredSlots {
    pub fn none() -> Self {
        Self::default()
    }

    /// Slots of every tag that no longer holds a credential.
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Self {
        Self {
            slots: tags
                .into_iter()
                .filter(|tag| !tag.is_encrypted())
                .map(|tag| KeyIdentifier::for_tag(&tag.id))
                .collect(),
        }
    }

    pub fn contains(&self, identifier: &KeyIdentifier) -> bool {
        self.slots.contains(identifier)
    }
}

enum KeyLookup {
    Available(Arc<SymmetricKey>),
    Locked,
    StoreUnavailable,
}

/// Seals and opens entry fields under the key that governs each entry.
pub struct EncryptionCoordinator {
    sessions: Arc<AccessSessionManager>,
    secrets: Arc<dyn SecretStore>,
    root: Mutex<Option<Arc<SymmetricKey>>>,
}

impl EncryptionCoordinator {
    pub fn new(sessions: Arc<AccessSessionManager>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            sessions,
            secrets,
            root: Mutex::new(None),
        }
    }

    /// Governing domain of an entry, from its current tag snapshot.
    pub fn domain_for(entry: &Entry) -> EncryptionDomain {
        match entry.tags.iter().find(|tag| tag.encrypted) {
            Some(tag) => EncryptionDomain::Tag(tag.id),
            None if entry.base_encrypted => EncryptionDomain::Base,
            None => EncryptionDomain::Unprotected,
        }
    }

    /// Protect one field in place.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::Crypto` or `MurmurError::Decryption` when sealing
    /// or re-homing fails. A missing key is reported through the outcome,
    /// not as an error.
    pub fn protect(&self, name: FieldName, entry: &mut Entry) -> Result<WriteOutcome> {
        self.protect_field(name, entry, &RetiredSlots::none())
            .map(|(outcome, _)| outcome)
    }

    /// Protect every field of `entry` and hand back the token storage needs
    /// to persist it.
    ///
    /// A field whose ciphertext cannot be opened is reported as
    /// `WriteOutcome::Unreadable` and left untouched; the other fields are
    /// still reconciled. Any other error fails the call, and the entry may
    /// then hold a mix of sealed and plaintext fields and must not be saved.
    pub(crate) fn reconcile<'a>(
        &self,
        entry: &'a mut Entry,
        retired: &RetiredSlots,
    ) -> Result<(Reconciled<'a>, ReconcileReport)> {
        let domain = Self::domain_for(entry);
        let mut fields = Vec::with_capacity(FieldName::ALL.len());
        let mut store_degraded = false;

        for name in FieldName::ALL {
            let (outcome, degraded) = self.protect_field(name, entry, retired)?;
            store_degraded |= degraded;
            fields.push((name, outcome));
        }

        let report = ReconcileReport {
            entry_id: entry.id,
            domain,
            fields,
            store_degraded,
        };
        if !report.is_settled() {
            tracing::debug!(
                entry_id = %entry.id,
                deferred = report.deferred_fields().len(),
                "entry reconciled with pending fields"
            );
        }

        let entry: &'a Entry = entry;
        Ok((Reconciled::new(entry), report))
    }

    /// True if a reconcile pass could change anything about this entry.
    ///
    /// Ciphertext under a retired slot is never counted.
    pub fn needs_reconcile(entry: &Entry, retired: &RetiredSlots) -> bool {
        let target = Self::domain_for(entry).key_identifier();
        FieldName::ALL.iter().any(|name| {
            let field = entry.field(*name);
            match (&target, field.plaintext().is_some(), field.sealed_with()) {
                (Some(_), true, _) => true,
                (Some(target), false, Some(current)) => {
                    current != target && !retired.contains(current)
                }
                (None, true, _) => field.is_deferred(),
                _ => false,
            }
        })
    }

    /// Fields sealed under a slot whose key was destroyed.
    pub fn retired_fields(entry: &Entry, retired: &RetiredSlots) -> Vec<FieldName> {
        FieldName::ALL
            .iter()
            .copied()
            .filter(|name| {
                let field = entry.field(*name);
                field.ciphertext().is_some()
                    && field.sealed_with().is_some_and(|slot| retired.contains(slot))
            })
            .collect()
    }

    /// Readable bytes of a field.
    pub fn reveal(&self, name: FieldName, entry: &Entry) -> Result<Revealed<Zeroizing<Vec<u8>>>> {
        let field = entry.field(name);
        if let Some(plaintext) = field.plaintext() {
            return Ok(Revealed::Plain(Zeroizing::new(plaintext.to_vec())));
        }
        let Some(ciphertext) = field.ciphertext() else {
            return Ok(Revealed::Empty);
        };

        let identifier = field
            .sealed_with()
            .cloned()
            .or_else(|| Self::domain_for(entry).key_identifier())
            .ok_or_else(|| {
                MurmurError::Decryption(format!("{} is sealed but names no key", name))
            })?;

        match self.lookup(&identifier)? {
            KeyLookup::Available(key) => Ok(Revealed::Plain(open(ciphertext, &key)?)),
            KeyLookup::Locked | KeyLookup::StoreUnavailable => Ok(Revealed::Locked),
        }
    }

    /// Readable text of a field.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::Encoding` if the content is not UTF-8.
    pub fn reveal_text(&self, name: FieldName, entry: &Entry) -> Result<Revealed<String>> {
        match self.reveal(name, entry)? {
            Revealed::Plain(bytes) => String::from_utf8(bytes.to_vec())
                .map(Revealed::Plain)
                .map_err(|e| MurmurError::Encoding(e.to_string())),
            Revealed::Locked => Ok(Revealed::Locked),
            Revealed::Empty => Ok(Revealed::Empty),
        }
    }

    /// Drop the cached root key. It is re-read from the secret store on next use.
    pub fn forget_root_key(&self) {
        *self.root.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn protect_field(
        &self,
        name: FieldName,
        entry: &mut Entry,
        retired: &RetiredSlots,
    ) -> Result<(WriteOutcome, bool)> {
        let entry_id = entry.id;
        let target = Self::domain_for(entry).key_identifier();
        let field = entry.field_mut(name);

        if let Some(plaintext) = field.plaintext().map(|p| Zeroizing::new(p.to_vec())) {
            let Some(target) = target else {
                field.mark_deferred(false);
                return Ok((WriteOutcome::Unprotected, false));
            };
            return match self.lookup(&target)? {
                KeyLookup::Available(key) => {
                    let sealed = seal(&plaintext, &key)?;
                    field.store_sealed(sealed, target);
                    tracing::debug!(entry_id = %entry_id, field = %name, "field sealed");
                    Ok((WriteOutcome::Encrypted, false))
                }
                KeyLookup::Locked => {
                    field.mark_deferred(true);
                    Ok((WriteOutcome::DeferredPlaintext, false))
                }
                KeyLookup::StoreUnavailable => {
                    field.mark_deferred(true);
                    tracing::warn!(
                        entry_id = %entry_id,
                        field = %name,
                        "secret store unavailable, keeping field as deferred plaintext"
                    );
                    Ok((WriteOutcome::DeferredPlaintext, true))
                }
            };
        }

        let Some(ciphertext) = field.ciphertext().map(<[u8]>::to_vec) else {
            return Ok((WriteOutcome::Empty, false));
        };

        if field.sealed_with().is_some_and(|slot| retired.contains(slot)) {
            return Ok((WriteOutcome::Unreadable, false));
        }

        // Sealed content never drops back to plaintext, even on an
        // unprotected entry.
        let Some(target) = target else {
            return Ok((WriteOutcome::Encrypted, false));
        };
        let current = match field.sealed_with() {
            Some(current) if *current != target => current.clone(),
            _ => return Ok((WriteOutcome::Encrypted, false)),
        };

        let (old_key, new_key) = match (self.lookup(&current)?, self.lookup(&target)?) {
            (KeyLookup::Available(old), KeyLookup::Available(new)) => (old, new),
            (old, new) => {
                let degraded = matches!(old, KeyLookup::StoreUnavailable)
                    || matches!(new, KeyLookup::StoreUnavailable);
                return Ok((WriteOutcome::Locked, degraded));
            }
        };

        let plaintext = match open(&ciphertext, &old_key) {
            Ok(plaintext) => plaintext,
            Err(MurmurError::Decryption(message)) => {
                tracing::warn!(
                    entry_id = %entry_id,
                    field = %name,
                    sealed_with = %current,
                    error = %message,
                    "field failed authentication, left as stored"
                );
                return Ok((WriteOutcome::Unreadable, false));
            }
            Err(err) => return Err(err),
        };
        let sealed = seal(&plaintext, &new_key)?;
        field.store_sealed(sealed, target.clone());
        tracing::debug!(
            entry_id = %entry_id,
            field = %name,
            from = %current,
            to = %target,
            "field re-sealed under governing key"
        );
        Ok((WriteOutcome::Encrypted, false))
    }

    fn lookup(&self, identifier: &KeyIdentifier) -> Result<KeyLookup> {
        if identifier.is_root() {
            return match self.root_key() {
                Ok(key) => Ok(KeyLookup::Available(key)),
                Err(MurmurError::Store(message)) => {
                    tracing::warn!(error = %message, "root key unavailable");
                    Ok(KeyLookup::StoreUnavailable)
                }
                Err(err) => Err(err),
            };
        }
        Ok(identifier
            .tag_id()
            .and_then(|tag_id| self.sessions.get_key(&tag_id))
            .map_or(KeyLookup::Locked, KeyLookup::Available))
    }

    /// Cached root key, provisioned on first use.
    fn root_key(&self) -> Result<Arc<SymmetricKey>> {
        let mut cached = self.root.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = cached.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = Arc::new(provision_root_key(self.secrets.as_ref())?);
        *cached = Some(Arc::clone(&key));
        Ok(key)
    }
}
