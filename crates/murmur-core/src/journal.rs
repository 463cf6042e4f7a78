//! The journal: the single write path for entries.
//!
//! `Journal` ties storage, the secret store, the session manager and the
//! coordinator together. Every entry write goes through `save_entry`, which
//! refreshes the entry's tag snapshot, reconciles it, and only then commits.
//! Storage accepts nothing but reconciled entries and reconciling is private
//! to this crate, so no other path can persist an entry.
//!
//! Entry writes and tag credential changes share one lock, so a save never
//! acts on a tag snapshot that a concurrent `protect_tag` has made stale.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::coordinator::{
    EncryptionCoordinator, ReconcileReport, RetiredSlots, Revealed, WriteOutcome,
};
use crate::crypto::pin::MIN_PIN_LENGTH;
use crate::error::{MurmurError, Result};
use crate::secrets::{KeyIdentifier, SecretStore};
use crate::session::AccessSessionManager;
use crate::storage::{Entry, EntryFilter, EntryTag, FieldName, StorageEngine, Tag};
use crate::tags::TagCredentials;

/// Journal-wide settings.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Minimum PIN length for new tag credentials
    pub min_pin_length: usize,

    /// Whether new entries opt into base (root key) encryption
    pub base_encrypted_by_default: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            min_pin_length: MIN_PIN_LENGTH,
            base_encrypted_by_default: true,
        }
    }
}

/// Result of a maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries that needed work
    pub examined: usize,
    /// Entries now fully sealed under their governing key
    pub upgraded: usize,
    /// Entries still waiting for a locked key
    pub still_pending: usize,
    /// Entries that could not be reconciled
    pub failed: usize,
    /// Examined entries with a field that can no longer be opened
    pub unreadable: usize,
}

/// How much of the journal is not yet fully protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectionStatus {
    pub entries: usize,
    /// Entries with at least one field of deferred plaintext
    pub deferred_entries: usize,
    /// Entries whose ciphertext still sits under a previous governing key
    pub rehome_pending: usize,
    /// Entries with content sealed under a destroyed tag key. Never pending.
    pub unrecoverable: usize,
    pub encrypted_tags: usize,
    pub unlocked_tags: usize,
}

impl ProtectionStatus {
    pub fn is_fully_protected(&self) -> bool {
        self.deferred_entries == 0 && self.rehome_pending == 0
    }
}

/// Result of enabling encryption on a tag.
#[derive(Debug, Clone)]
pub struct TagProtection {
    pub tag: Tag,
    /// Entries carrying the tag that were re-sealed under its key
    pub resealed: usize,
}

/// Result of removing a tag's encryption.
#[derive(Debug, Clone)]
pub struct TagRelease {
    pub tag: Tag,
    /// Entries moved from the tag key to their next governing key
    pub reprotected: usize,
}

/// Result of destroying a tag's key.
#[derive(Debug, Clone)]
pub struct TagForgotten {
    pub tag: Tag,
    /// Entries with content that was still sealed under the destroyed key
    pub lost_entries: usize,
}

/// A journal of voice entries with tag-scoped encryption.
pub struct Journal {
    storage: Arc<dyn StorageEngine>,
    sessions: Arc<AccessSessionManager>,
    coordinator: EncryptionCoordinator,
    credentials: TagCredentials,
    config: JournalConfig,
    writes: Mutex<()>,
}

impl Journal {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        secrets: Arc<dyn SecretStore>,
        config: JournalConfig,
    ) -> Self {
        let sessions = Arc::new(AccessSessionManager::new(Arc::clone(&secrets)));
        let coordinator = EncryptionCoordinator::new(Arc::clone(&sessions), Arc::clone(&secrets));
        let credentials =
            TagCredentials::new(Arc::clone(&storage), secrets, config.min_pin_length);
        Self {
            storage,
            sessions,
            coordinator,
            credentials,
            config,
            writes: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &dyn StorageEngine {
        self.storage.as_ref()
    }

    pub fn sessions(&self) -> &Arc<AccessSessionManager> {
        &self.sessions
    }

    pub fn coordinator(&self) -> &EncryptionCoordinator {
        &self.coordinator
    }

    pub fn credentials(&self) -> &TagCredentials {
        &self.credentials
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    // --- Tags ---

    pub fn create_tag(&self, name: &str) -> Result<Tag> {
        let tag = Tag::new(name.trim());
        self.storage.create_tag(&tag)?;
        tracing::debug!(tag_id = %tag.id, "tag created");
        Ok(tag)
    }

    pub fn tag(&self, id: &Uuid) -> Result<Tag> {
        self.storage
            .get_tag(id)?
            .ok_or_else(|| MurmurError::TagNotFound(id.to_string()))
    }

    pub fn tag_by_name(&self, name: &str) -> Result<Tag> {
        self.storage
            .get_tag_by_name(name)?
            .ok_or_else(|| MurmurError::TagNotFound(name.to_string()))
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.storage.list_tags()
    }

    /// Put a tag under PIN protection, unlock it for this session, and
    /// re-seal every entry that carries it.
    pub fn protect_tag(&self, tag_id: &Uuid, pin: &str) -> Result<TagProtection> {
        let _writes = self.write_guard();
        let tag = self.credentials.set_pin(tag_id, pin)?;
        if !self.sessions.grant_access(&tag, pin)? {
            return Err(MurmurError::AuthorizationFailure);
        }

        let mut resealed = 0;
        for mut entry in self.storage.list_entries(&EntryFilter::new().tag(tag.id))? {
            let report = self.save_locked(&mut entry)?;
            if report.domain.key_identifier().as_ref()
                == tag.credential.as_ref().map(|c| &c.key_identifier)
            {
                resealed += 1;
            }
        }

        Ok(TagProtection { tag, resealed })
    }

    /// Unlock a tag for the rest of the session.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::AuthorizationFailure` for a wrong PIN or a tag
    /// that is not encrypted.
    pub fn unlock_tag(&self, tag_id: &Uuid, pin: &str) -> Result<Tag> {
        let tag = self.tag(tag_id)?;
        if self.sessions.grant_access(&tag, pin)? {
            Ok(tag)
        } else {
            Err(MurmurError::AuthorizationFailure)
        }
    }

    pub fn lock_tag(&self, tag_id: &Uuid) -> bool {
        self.sessions.revoke_access(tag_id)
    }

    /// Lock everything: revoke all grants and drop the cached root key.
    pub fn lock_all(&self) -> usize {
        self.coordinator.forget_root_key();
        self.sessions.clear_all_access()
    }

    /// Remove a tag's encryption without losing content.
    ///
    /// Unlocks the tag, moves every entry carrying it to its next governing
    /// key (another encrypted tag, else the root key), and only then destroys
    /// the tag key. Entries that were unprotected before the tag was
    /// encrypted stay base-encrypted.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::AuthorizationFailure` for a wrong PIN. If any
    /// entry cannot be moved the tag keeps its encryption and a
    /// `MurmurError::Storage` error reports how many entries are stuck.
    /// Fields that fail authentication are already lost; they are logged
    /// and do not hold the removal back.
    pub fn remove_tag_encryption(&self, tag_id: &Uuid, pin: &str) -> Result<TagRelease> {
        let _writes = self.write_guard();
        let tag = self.tag(tag_id)?;
        if !tag.is_encrypted() {
            return Err(MurmurError::Validation(format!(
                "Tag '{}' is not encrypted",
                tag.name
            )));
        }
        if !self.sessions.grant_access(&tag, pin)? {
            return Err(MurmurError::AuthorizationFailure);
        }

        let mut reprotected = 0;
        let mut stuck = 0;
        for mut entry in self.storage.list_entries(&EntryFilter::new().tag(tag.id))? {
            self.refresh_tags(&mut entry)?;
            for snapshot in entry.tags.iter_mut().filter(|t| t.id == tag.id) {
                snapshot.encrypted = false;
            }
            entry.base_encrypted = true;

            let report = self.commit(&mut entry)?;
            let unreadable = report.unreadable_fields();
            if !unreadable.is_empty() {
                tracing::warn!(
                    entry_id = %entry.id,
                    fields = ?unreadable,
                    "entry has unreadable fields, moving the rest"
                );
            }
            if report.is_settled() {
                reprotected += 1;
            } else {
                stuck += 1;
            }
        }

        if stuck > 0 {
            return Err(MurmurError::Storage(format!(
                "{} entries could not be re-protected; encryption of '{}' left in place",
                stuck, tag.name
            )));
        }

        self.sessions.revoke_access(&tag.id);
        let tag = self.credentials.clear_encryption(&tag.id)?;
        tracing::info!(tag_id = %tag.id, reprotected, "tag encryption removed");
        Ok(TagRelease { tag, reprotected })
    }

    /// Destroy a tag's key without moving any content.
    ///
    /// Everything still sealed under the tag becomes permanently unreadable.
    /// The returned count says how many entries that affects; afterwards such
    /// content is reported as unrecoverable rather than pending.
    pub fn clear_tag_encryption_destructive(&self, tag_id: &Uuid) -> Result<TagForgotten> {
        let _writes = self.write_guard();
        let slot = KeyIdentifier::for_tag(tag_id);
        let lost_entries = self
            .storage
            .list_entries(&EntryFilter::new())?
            .iter()
            .filter(|entry| {
                FieldName::ALL.iter().any(|name| {
                    let field = entry.field(*name);
                    field.ciphertext().is_some() && field.sealed_with() == Some(&slot)
                })
            })
            .count();

        self.sessions.revoke_access(tag_id);
        let tag = self.credentials.clear_encryption(tag_id)?;
        if lost_entries > 0 {
            tracing::warn!(tag_id = %tag.id, lost_entries, "tag key destroyed with content still sealed under it");
        }
        Ok(TagForgotten { tag, lost_entries })
    }

    // --- Entries ---

    /// A new, unsaved entry using the journal's base encryption default.
    pub fn new_entry(&self) -> Entry {
        Entry::new(self.config.base_encrypted_by_default)
    }

    /// Attach a tag to an in-memory entry. Takes effect on the next save.
    pub fn assign_tag(&self, entry: &mut Entry, tag_id: &Uuid) -> Result<()> {
        let tag = self.tag(tag_id)?;
        entry.attach_tag(EntryTag::from(&tag));
        Ok(())
    }

    /// Detach a tag from an in-memory entry. Takes effect on the next save.
    pub fn remove_tag(&self, entry: &mut Entry, tag_id: &Uuid) -> bool {
        entry.detach_tag(tag_id)
    }

    /// Reconcile and persist an entry.
    ///
    /// This is the only way to write an entry. The entry is modified in
    /// place to match what was stored.
    pub fn save_entry(&self, entry: &mut Entry) -> Result<ReconcileReport> {
        let _writes = self.write_guard();
        self.save_locked(entry)
    }

    /// Load an entry, apply `edit`, and save it with no other write in between.
    ///
    /// # Errors
    ///
    /// Returns `MurmurError::EntryNotFound` for an unknown id, or whatever
    /// `edit` returns; nothing is saved in either case.
    pub fn update_entry<F>(&self, id: &Uuid, edit: F) -> Result<ReconcileReport>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        let _writes = self.write_guard();
        let mut entry = self.load_entry(id)?;
        edit(&mut entry)?;
        self.save_locked(&mut entry)
    }

    pub fn load_entry(&self, id: &Uuid) -> Result<Entry> {
        self.storage
            .get_entry(id)?
            .ok_or(MurmurError::EntryNotFound(*id))
    }

    pub fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>> {
        self.storage.list_entries(filter)
    }

    pub fn reveal(&self, entry: &Entry, field: FieldName) -> Result<Revealed<Zeroizing<Vec<u8>>>> {
        self.coordinator.reveal(field, entry)
    }

    pub fn reveal_text(&self, entry: &Entry, field: FieldName) -> Result<Revealed<String>> {
        self.coordinator.reveal_text(field, entry)
    }

    // --- Maintenance ---

    /// Reconcile every entry that still has deferred plaintext or ciphertext
    /// under a previous governing key.
    ///
    /// Failures on one entry are logged and counted; the sweep continues.
    /// Content under a destroyed tag key is not work and is skipped.
    pub fn sweep_deferred(&self) -> Result<SweepReport> {
        let _writes = self.write_guard();
        let mut report = SweepReport::default();
        let retired = self.retired_slots()?;

        for mut entry in self.storage.list_entries(&EntryFilter::new())? {
            if !EncryptionCoordinator::needs_reconcile(&entry, &retired) {
                continue;
            }
            report.examined += 1;

            match self.save_locked(&mut entry) {
                Ok(outcome) => {
                    if !outcome.unreadable_fields().is_empty() {
                        report.unreadable += 1;
                    }
                    if outcome.is_settled() {
                        report.upgraded += 1;
                    } else {
                        report.still_pending += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(entry_id = %entry.id, error = %err, "sweep failed for entry");
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                upgraded = report.upgraded,
                still_pending = report.still_pending,
                failed = report.failed,
                unreadable = report.unreadable,
                "deferred sweep finished"
            );
        }
        Ok(report)
    }

    pub fn protection_status(&self) -> Result<ProtectionStatus> {
        let entries = self.storage.list_entries(&EntryFilter::new())?;
        let tags = self.storage.list_tags()?;
        let retired = RetiredSlots::from_tags(&tags);

        let deferred_entries = entries.iter().filter(|e| e.has_deferred()).count();
        let rehome_pending = entries
            .iter()
            .filter(|e| !e.has_deferred() && EncryptionCoordinator::needs_reconcile(e, &retired))
            .count();
        let unrecoverable = entries
            .iter()
            .filter(|e| !EncryptionCoordinator::retired_fields(e, &retired).is_empty())
            .count();
        let encrypted_tags = tags.iter().filter(|t| t.is_encrypted()).count();

        Ok(ProtectionStatus {
            entries: entries.len(),
            deferred_entries,
            rehome_pending,
            unrecoverable,
            encrypted_tags,
            unlocked_tags: self.sessions.unlocked_tags().len(),
        })
    }

    pub fn check_integrity(&self) -> Result<()> {
        self.storage.check_integrity()
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn retired_slots(&self) -> Result<RetiredSlots> {
        Ok(RetiredSlots::from_tags(&self.storage.list_tags()?))
    }

    /// Save with the write lock already held.
    fn save_locked(&self, entry: &mut Entry) -> Result<ReconcileReport> {
        self.refresh_tags(entry)?;
        self.commit(entry)
    }

    fn refresh_tags(&self, entry: &mut Entry) -> Result<()> {
        for snapshot in entry.tags.iter_mut() {
            let tag = self.tag(&snapshot.id)?;
            *snapshot = EntryTag::from(&tag);
        }
        Ok(())
    }

    fn commit(&self, entry: &mut Entry) -> Result<ReconcileReport> {
        entry.updated_at = Utc::now();
        let retired = self.retired_slots()?;
        let (reconciled, report) = self.coordinator.reconcile(entry, &retired)?;
        self.storage.save_entry(&reconciled)?;

        for (field, outcome) in &report.fields {
            if *outcome == WriteOutcome::DeferredPlaintext {
                tracing::debug!(entry_id = %report.entry_id, field = %field, "field deferred");
            }
        }
        Ok(report)
    }
}
