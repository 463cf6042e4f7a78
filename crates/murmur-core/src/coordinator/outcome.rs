//! Result types of coordinator operations.

use serde::Serialize;
use uuid::Uuid;

use crate::secrets::KeyIdentifier;
use crate::storage::{Entry, FieldName};

/// Which key governs an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "tag_id", rename_all = "snake_case")]
pub enum EncryptionDomain {
    /// No tag is encrypted and the entry opted out of base encryption.
    Unprotected,
    /// The root key.
    Base,
    /// The key of this encrypted tag.
    Tag(Uuid),
}

impl EncryptionDomain {
    /// Secret store slot of the governing key, if any.
    pub fn key_identifier(&self) -> Option<KeyIdentifier> {
        match self {
            EncryptionDomain::Unprotected => None,
            EncryptionDomain::Base => Some(KeyIdentifier::root()),
            EncryptionDomain::Tag(tag_id) => Some(KeyIdentifier::for_tag(tag_id)),
        }
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self, EncryptionDomain::Unprotected)
    }
}

/// What happened to one field when it was protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Content is sealed under the governing key.
    Encrypted,
    /// Governing key unavailable; plaintext kept and flagged for later sealing.
    DeferredPlaintext,
    /// Content is sealed under a key that is not available, so it could not
    /// be moved to the governing key yet.
    Locked,
    /// The entry is not protected; plaintext kept as-is.
    Unprotected,
    /// Sealed content can no longer be opened: its key was destroyed or it
    /// fails authentication. The field is left exactly as stored.
    Unreadable,
    /// Nothing stored.
    Empty,
}

/// Readable content, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revealed<T> {
    Plain(T),
    /// Sealed under a key that is not currently available.
    Locked,
    Empty,
}

impl<T> Revealed<T> {
    pub fn plain(self) -> Option<T> {
        match self {
            Revealed::Plain(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Revealed::Locked)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Revealed<U> {
        match self {
            Revealed::Plain(value) => Revealed::Plain(f(value)),
            Revealed::Locked => Revealed::Locked,
            Revealed::Empty => Revealed::Empty,
        }
    }
}

/// Per-field outcomes of reconciling one entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entry_id: Uuid,
    pub domain: EncryptionDomain,
    pub fields: Vec<(FieldName, WriteOutcome)>,
    /// A key lookup hit a secret store failure during this pass.
    pub store_degraded: bool,
}

impl ReconcileReport {
    pub fn outcome(&self, name: FieldName) -> Option<WriteOutcome> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, outcome)| *outcome)
    }

    /// Fields left in plaintext waiting for a key.
    pub fn deferred_fields(&self) -> Vec<FieldName> {
        self.fields
            .iter()
            .filter(|(_, outcome)| *outcome == WriteOutcome::DeferredPlaintext)
            .map(|(field, _)| *field)
            .collect()
    }

    /// Fields whose stored ciphertext could not be opened.
    pub fn unreadable_fields(&self) -> Vec<FieldName> {
        self.fields
            .iter()
            .filter(|(_, outcome)| *outcome == WriteOutcome::Unreadable)
            .map(|(field, _)| *field)
            .collect()
    }

    /// True when nothing is deferred and nothing is stuck under a foreign key.
    ///
    /// Unreadable fields do not count: no key will ever settle them.
    pub fn is_settled(&self) -> bool {
        self.fields.iter().all(|(_, outcome)| {
            !matches!(
                outcome,
                WriteOutcome::DeferredPlaintext | WriteOutcome::Locked
            )
        })
    }
}

/// An entry that has just been through `EncryptionCoordinator::reconcile`.
///
/// Storage only persists entries wrapped in this type. It is built by the
/// crate-private reconcile step that `Journal::save_entry` runs, so every
/// save passes through the protection decision.
#[derive(Debug)]
pub struct Reconciled<'a> {
    entry: &'a Entry,
}

impl<'a> Reconciled<'a> {
    pub(crate) fn new(entry: &'a Entry) -> Self {
        Self { entry }
    }

    pub fn entry(&self) -> &'a Entry {
        self.entry
    }
}
