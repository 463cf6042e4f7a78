//! Storage engine trait definition.
//!
//! The `StorageEngine` trait is the persistence seam of the journal. It
//! stores tags, their PIN credentials, and entries with their protected
//! fields exactly as the coordinator left them. It never encrypts or
//! decrypts anything itself.

use std::path::Path;
use uuid::Uuid;

use super::types::{Entry, EntryFilter, JournalMetadata, Tag, TagCredential};
use crate::coordinator::Reconciled;
use crate::error::Result;

/// Storage engine interface for journal persistence.
///
/// All implementations must ensure:
/// - Writes are atomic: an entry and its tag assignments land together
/// - A field never holds plaintext and ciphertext at the same time
/// - Tag credentials are stored whole or not at all
/// - UUIDs are used for all identifiers
pub trait StorageEngine: Send + Sync {
    /// Create a new journal at the specified path.
    ///
    /// # Returns
    ///
    /// Returns the journal ID, which scopes the journal's secret store slots.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::Storage` if:
    /// - File already exists
    /// - Cannot write to path
    fn create(path: &Path) -> Result<Uuid>
    where
        Self: Sized;

    /// Open an existing journal.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::JournalNotFound` if the file does not exist and
    /// `MurmurError::Storage` if it is not a journal.
    fn open(path: &Path) -> Result<Self>
    where
        Self: Sized;

    /// Get journal metadata.
    fn metadata(&self) -> Result<JournalMetadata>;

    // --- Tag operations ---

    /// Insert a new tag.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::Validation` if the name is empty or another tag
    /// already uses it (names compare case-insensitively).
    fn create_tag(&self, tag: &Tag) -> Result<()>;

    /// Get a tag by ID.
    fn get_tag(&self, id: &Uuid) -> Result<Option<Tag>>;

    /// Get a tag by name (case-insensitive).
    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// List all tags, ordered by name.
    fn list_tags(&self) -> Result<Vec<Tag>>;

    /// Set or clear a tag's PIN credential.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::TagNotFound` if the tag does not exist.
    fn update_tag_credential(&self, id: &Uuid, credential: Option<&TagCredential>) -> Result<()>;

    // --- Entry operations ---

    /// Insert or replace an entry together with its tag assignments.
    ///
    /// Only reconciled entries are accepted; see `Journal::save_entry`.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::TagNotFound` if the entry references an unknown
    /// tag. Returns `MurmurError::Validation` if a field holds both plaintext
    /// and ciphertext, or if the entry is protected (base encryption or a tag
    /// with a credential, as committed) and a field holds plaintext that is
    /// not flagged deferred.
    fn save_entry(&self, entry: &Reconciled<'_>) -> Result<()>;

    /// Get an entry by ID.
    ///
    /// The tag snapshot of the returned entry reflects the tags' current
    /// encryption state, not the state at the time of the last save.
    fn get_entry(&self, id: &Uuid) -> Result<Option<Entry>>;

    /// List entries matching the filter, newest first.
    fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>>;

    /// Check database integrity.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::Storage` describing the first problem found.
    fn check_integrity(&self) -> Result<()>;
}
