//! Core data types for the storage layer.
//!
//! Entries hold their sensitive content in `ProtectedField`s: a plaintext
//! slot and a ciphertext slot, of which at most one is populated. Key
//! material never appears in these types; ciphertext slots only record the
//! `KeyIdentifier` they were sealed under.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::secrets::KeyIdentifier;

/// Metadata for a journal database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalMetadata {
    /// Format version (e.g., "0.1")
    pub format_version: String,

    /// Stable identifier of this journal; scopes its secret store slots
    pub journal_id: Uuid,

    /// When this journal was created
    pub created_at: DateTime<Utc>,
}

/// PIN credential of an encrypted tag.
///
/// Either the whole credential is present or the tag is not encrypted; a
/// hash without a salt (or the reverse) cannot be represented.
#[derive(Clone, PartialEq, Eq)]
pub struct TagCredential {
    /// Hex SHA-256 of salt || PIN
    pub pin_hash: String,

    /// Random 16-byte salt
    pub pin_salt: Vec<u8>,

    /// Secret store slot holding the tag key
    pub key_identifier: KeyIdentifier,
}

impl fmt::Debug for TagCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagCredential")
            .field("pin_hash", &"[REDACTED]")
            .field("pin_salt", &"[REDACTED]")
            .field("key_identifier", &self.key_identifier)
            .finish()
    }
}

/// A user-defined tag.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Unique identifier for this tag
    pub id: Uuid,

    /// User-facing name (unique, case-insensitive)
    pub name: String,

    /// When this tag was created
    pub created_at: DateTime<Utc>,

    /// PIN credential, present iff the tag is encrypted
    pub credential: Option<TagCredential>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            credential: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.credential.is_some()
    }
}

/// A tag as seen from an entry: enough to decide the entry's protection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTag {
    pub id: Uuid,
    pub name: String,
    pub encrypted: bool,
}

impl From<&Tag> for EntryTag {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            encrypted: tag.is_encrypted(),
        }
    }
}

/// Names of the protected fields an entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Transcript,
    EnhancedText,
    Analysis,
    Audio,
}

impl FieldName {
    pub const ALL: [FieldName; 4] = [
        FieldName::Transcript,
        FieldName::EnhancedText,
        FieldName::Analysis,
        FieldName::Audio,
    ];

    /// Column prefix used by storage backends.
    pub fn column(self) -> &'static str {
        match self {
            FieldName::Transcript => "transcript",
            FieldName::EnhancedText => "enhanced_text",
            FieldName::Analysis => "analysis",
            FieldName::Audio => "audio",
        }
    }

    /// Whether the field holds UTF-8 text (as opposed to raw bytes).
    pub fn is_text(self) -> bool {
        !matches!(self, FieldName::Audio)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A persisted attribute with a plaintext slot and a ciphertext slot.
///
/// Writing new content always lands in the plaintext slot and discards any
/// previous ciphertext; the coordinator later moves it into the ciphertext
/// slot. Plaintext bytes are zeroized when replaced or dropped.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProtectedField {
    plaintext: Option<Vec<u8>>,
    ciphertext: Option<Vec<u8>>,
    sealed_with: Option<KeyIdentifier>,
    deferred: bool,
}

impl ProtectedField {
    /// Restore a field exactly as it was persisted.
    pub fn from_parts(
        plaintext: Option<Vec<u8>>,
        ciphertext: Option<Vec<u8>>,
        sealed_with: Option<KeyIdentifier>,
        deferred: bool,
    ) -> Self {
        Self {
            plaintext,
            ciphertext,
            sealed_with,
            deferred,
        }
    }

    /// Replace the content with new plaintext.
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.wipe_plaintext();
        self.plaintext = Some(bytes);
        self.ciphertext = None;
        self.sealed_with = None;
        self.deferred = false;
    }

    pub fn set_text(&mut self, text: &str) {
        self.set_bytes(text.as_bytes().to_vec());
    }

    /// Remove all content.
    pub fn clear(&mut self) {
        self.wipe_plaintext();
        self.ciphertext = None;
        self.sealed_with = None;
        self.deferred = false;
    }

    pub fn plaintext(&self) -> Option<&[u8]> {
        self.plaintext.as_deref()
    }

    pub fn ciphertext(&self) -> Option<&[u8]> {
        self.ciphertext.as_deref()
    }

    pub fn sealed_with(&self) -> Option<&KeyIdentifier> {
        self.sealed_with.as_ref()
    }

    /// True while plaintext is waiting for its governing key.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext.is_none() && self.ciphertext.is_none()
    }

    pub(crate) fn store_sealed(&mut self, ciphertext: Vec<u8>, sealed_with: KeyIdentifier) {
        // Ciphertext lands before the plaintext is wiped.
        self.ciphertext = Some(ciphertext);
        self.sealed_with = Some(sealed_with);
        self.wipe_plaintext();
        self.deferred = false;
    }

    pub(crate) fn mark_deferred(&mut self, deferred: bool) {
        self.deferred = deferred;
    }

    fn wipe_plaintext(&mut self) {
        if let Some(mut bytes) = self.plaintext.take() {
            bytes.zeroize();
        }
    }
}

impl Drop for ProtectedField {
    fn drop(&mut self) {
        self.wipe_plaintext();
    }
}

impl fmt::Debug for ProtectedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedField")
            .field("plaintext_len", &self.plaintext.as_ref().map(Vec::len))
            .field("ciphertext_len", &self.ciphertext.as_ref().map(Vec::len))
            .field("sealed_with", &self.sealed_with)
            .field("deferred", &self.deferred)
            .finish()
    }
}

/// A journal entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// When this entry was created
    pub created_at: DateTime<Utc>,

    /// Last time this entry was saved
    pub updated_at: DateTime<Utc>,

    /// Whether the base (root) key protects this entry when no encrypted tag does
    pub base_encrypted: bool,

    /// Tags in assignment order
    pub tags: Vec<EntryTag>,

    pub transcript: ProtectedField,
    pub enhanced_text: ProtectedField,
    pub analysis: ProtectedField,
    pub audio: ProtectedField,
}

impl Entry {
    pub fn new(base_encrypted: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            base_encrypted,
            tags: Vec::new(),
            transcript: ProtectedField::default(),
            enhanced_text: ProtectedField::default(),
            analysis: ProtectedField::default(),
            audio: ProtectedField::default(),
        }
    }

    pub fn field(&self, name: FieldName) -> &ProtectedField {
        match name {
            FieldName::Transcript => &self.transcript,
            FieldName::EnhancedText => &self.enhanced_text,
            FieldName::Analysis => &self.analysis,
            FieldName::Audio => &self.audio,
        }
    }

    pub fn field_mut(&mut self, name: FieldName) -> &mut ProtectedField {
        match name {
            FieldName::Transcript => &mut self.transcript,
            FieldName::EnhancedText => &mut self.enhanced_text,
            FieldName::Analysis => &mut self.analysis,
            FieldName::Audio => &mut self.audio,
        }
    }

    /// Attach a tag, keeping assignment order. Re-attaching refreshes the snapshot.
    pub fn attach_tag(&mut self, tag: EntryTag) {
        if let Some(existing) = self.tags.iter_mut().find(|t| t.id == tag.id) {
            *existing = tag;
        } else {
            self.tags.push(tag);
        }
    }

    /// Detach a tag. Returns `true` if it was attached.
    pub fn detach_tag(&mut self, tag_id: &Uuid) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| &t.id != tag_id);
        self.tags.len() != before
    }

    /// True if any field still holds plaintext awaiting its key.
    pub fn has_deferred(&self) -> bool {
        FieldName::ALL.iter().any(|name| self.field(*name).is_deferred())
    }
}

/// Filter for listing entries.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Only entries carrying this tag
    pub tag_id: Option<Uuid>,

    /// Only entries with at least one deferred field
    pub deferred_only: bool,

    /// Maximum number of entries (newest first)
    pub limit: Option<usize>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag_id: Uuid) -> Self {
        self.tag_id = Some(tag_id);
        self
    }

    pub fn deferred_only(mut self) -> Self {
        self.deferred_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
