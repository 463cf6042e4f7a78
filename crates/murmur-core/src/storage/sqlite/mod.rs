//! SQLite storage backend.
//!
//! A single SQLite file holds journal metadata, tags with their PIN
//! credentials, and entries. Every protected field is stored as four
//! columns: `<field>_plain`, `<field>_cipher`, `<field>_sealed_with` and
//! `<field>_deferred`. Key material never reaches this database.

mod row;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::coordinator::Reconciled;
use crate::error::{MurmurError, Result};
use crate::storage::traits::StorageEngine;
use crate::storage::types::{
    Entry, EntryFilter, EntryTag, FieldName, JournalMetadata, ProtectedField, Tag, TagCredential,
};

use row::{EntryRow, TagRow, ENTRY_COLUMNS, TAG_COLUMNS};

const FORMAT_VERSION: &str = "0.1";

const SCHEMA: &str = r#"
    CREATE TABLE meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        created_at TEXT NOT NULL,
        pin_hash TEXT,
        pin_salt BLOB,
        key_identifier TEXT,

        -- A credential is stored whole or not at all
        CHECK ((pin_hash IS NULL) = (pin_salt IS NULL)),
        CHECK ((pin_hash IS NULL) = (key_identifier IS NULL))
    );

    CREATE TABLE entries (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        base_encrypted INTEGER NOT NULL,

        transcript_plain BLOB,
        transcript_cipher BLOB,
        transcript_sealed_with TEXT,
        transcript_deferred INTEGER NOT NULL DEFAULT 0,

        enhanced_text_plain BLOB,
        enhanced_text_cipher BLOB,
        enhanced_text_sealed_with TEXT,
        enhanced_text_deferred INTEGER NOT NULL DEFAULT 0,

        analysis_plain BLOB,
        analysis_cipher BLOB,
        analysis_sealed_with TEXT,
        analysis_deferred INTEGER NOT NULL DEFAULT 0,

        audio_plain BLOB,
        audio_cipher BLOB,
        audio_sealed_with TEXT,
        audio_deferred INTEGER NOT NULL DEFAULT 0,

        CHECK (transcript_plain IS NULL OR transcript_cipher IS NULL),
        CHECK (enhanced_text_plain IS NULL OR enhanced_text_cipher IS NULL),
        CHECK (analysis_plain IS NULL OR analysis_cipher IS NULL),
        CHECK (audio_plain IS NULL OR audio_cipher IS NULL)
    );

    CREATE INDEX entries_created_at ON entries(created_at);

    -- Tag assignments, in assignment order
    CREATE TABLE entry_tags (
        entry_id TEXT NOT NULL,
        tag_id TEXT NOT NULL,
        position INTEGER NOT NULL,

        PRIMARY KEY (entry_id, tag_id),
        FOREIGN KEY(entry_id) REFERENCES entries(id) ON DELETE CASCADE,
        FOREIGN KEY(tag_id) REFERENCES tags(id)
    );

    CREATE INDEX entry_tags_tag ON entry_tags(tag_id);
"#;

/// SQLite storage engine.
pub struct SqliteStorage {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    journal_id: Uuid,
}

impl SqliteStorage {
    /// Open a fresh journal that lives only in memory.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let journal_id = Self::initialize(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
            journal_id,
        })
    }

    /// Path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn journal_id(&self) -> Uuid {
        self.journal_id
    }

    /// Lock the database connection, returning an error if the mutex is poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MurmurError::Storage("SQLite connection poisoned".to_string()))
    }

    fn initialize(conn: &Connection) -> Result<Uuid> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA secure_delete = ON;")?;
        conn.execute_batch(SCHEMA)?;

        let journal_id = Uuid::new_v4();
        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?, ?)",
            ["format_version", FORMAT_VERSION],
        )?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?, ?)",
            ["journal_id", &journal_id.to_string()],
        )?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?, ?)",
            ["created_at", &created_at],
        )?;
        Ok(journal_id)
    }

    fn meta_value(conn: &Connection, key: &str) -> Result<String> {
        conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| MurmurError::Storage(format!("Metadata missing '{}'", key)))
    }

    #[cfg(unix)]
    fn restrict_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn restrict_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Whether a tag holds a credential, or `None` if it does not exist.
    fn tag_encrypted(tx: &Transaction<'_>, id: &Uuid) -> Result<Option<bool>> {
        Ok(tx
            .query_row(
                "SELECT key_identifier IS NOT NULL FROM tags WHERE id = ?",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn load_entry_tags(conn: &Connection, entry_id: &str) -> Result<Vec<EntryTag>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.name, t.key_identifier IS NOT NULL
            FROM entry_tags et
            JOIN tags t ON t.id = et.tag_id
            WHERE et.entry_id = ?
            ORDER BY et.position
            "#,
        )?;
        let rows = stmt.query_map([entry_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;

        let mut tags = Vec::new();
        for row in rows {
            let (id, name, encrypted) = row?;
            let id = Uuid::parse_str(&id)
                .map_err(|e| MurmurError::Storage(format!("Invalid tag UUID: {}", e)))?;
            tags.push(EntryTag {
                id,
                name,
                encrypted,
            });
        }
        Ok(tags)
    }

    fn entry_from_row(conn: &Connection, mut row: EntryRow) -> Result<Entry> {
        row.tags = Self::load_entry_tags(conn, &row.id)?;
        row.try_into()
    }
}

fn field_params(field: &ProtectedField) -> (Option<&[u8]>, Option<&[u8]>, Option<&str>, bool) {
    (
        field.plaintext(),
        field.ciphertext(),
        field.sealed_with().map(|id| id.as_str()),
        field.is_deferred(),
    )
}

fn validate_fields(entry: &Entry) -> Result<()> {
    for name in FieldName::ALL {
        let field = entry.field(name);
        if field.plaintext().is_some() && field.ciphertext().is_some() {
            return Err(MurmurError::Validation(format!(
                "{} holds both plaintext and ciphertext",
                name
            )));
        }
    }
    Ok(())
}

fn exposed_plaintext(entry: &Entry) -> Option<FieldName> {
    FieldName::ALL.into_iter().find(|name| {
        let field = entry.field(*name);
        field.plaintext().is_some() && !field.is_deferred()
    })
}

impl StorageEngine for SqliteStorage {
    fn create(path: &Path) -> Result<Uuid> {
        if path.exists() {
            return Err(MurmurError::Storage(
                "Journal file already exists".to_string(),
            ));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let journal_id = Self::initialize(&conn)?;
        Self::restrict_permissions(path)?;
        tracing::info!(path = %path.display(), journal_id = %journal_id, "journal created");
        Ok(journal_id)
    }

    fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MurmurError::JournalNotFound);
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA secure_delete = ON;")?;

        let journal_id_str = Self::meta_value(&conn, "journal_id")
            .map_err(|_| MurmurError::Storage("Not a journal database".to_string()))?;
        let journal_id = Uuid::parse_str(&journal_id_str).map_err(|e| {
            MurmurError::Storage(format!("Invalid journal_id in metadata: {}", e))
        })?;

        tracing::debug!(path = %path.display(), "journal opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
            journal_id,
        })
    }

    fn metadata(&self) -> Result<JournalMetadata> {
        let conn = self.lock_conn()?;

        let format_version = Self::meta_value(&conn, "format_version")?;
        let created_at_str = Self::meta_value(&conn, "created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| MurmurError::Storage(format!("Invalid created_at timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(JournalMetadata {
            format_version,
            journal_id: self.journal_id,
            created_at,
        })
    }

    // --- Tag operations ---

    fn create_tag(&self, tag: &Tag) -> Result<()> {
        let name = tag.name.trim();
        if name.is_empty() {
            return Err(MurmurError::Validation(
                "Tag name cannot be empty".to_string(),
            ));
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM tags WHERE name = ? COLLATE NOCASE",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(MurmurError::Validation(format!(
                "Tag '{}' already exists",
                name
            )));
        }

        let credential = tag.credential.as_ref();
        tx.execute(
            "INSERT INTO tags (id, name, created_at, pin_hash, pin_salt, key_identifier) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                tag.id.to_string(),
                name,
                tag.created_at.to_rfc3339(),
                credential.map(|c| c.pin_hash.as_str()),
                credential.map(|c| c.pin_salt.as_slice()),
                credential.map(|c| c.key_identifier.as_str()),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_tag(&self, id: &Uuid) -> Result<Option<Tag>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM tags WHERE id = ?", TAG_COLUMNS),
                [id.to_string()],
                TagRow::from_row,
            )
            .optional()?;
        row.map(Tag::try_from).transpose()
    }

    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM tags WHERE name = ? COLLATE NOCASE",
                    TAG_COLUMNS
                ),
                [name.trim()],
                TagRow::from_row,
            )
            .optional()?;
        row.map(Tag::try_from).transpose()
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tags ORDER BY name COLLATE NOCASE",
            TAG_COLUMNS
        ))?;
        let rows = stmt.query_map([], TagRow::from_row)?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(Tag::try_from(row?)?);
        }
        Ok(tags)
    }

    fn update_tag_credential(&self, id: &Uuid, credential: Option<&TagCredential>) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE tags SET pin_hash = ?, pin_salt = ?, key_identifier = ? WHERE id = ?",
            params![
                credential.map(|c| c.pin_hash.as_str()),
                credential.map(|c| c.pin_salt.as_slice()),
                credential.map(|c| c.key_identifier.as_str()),
                id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(MurmurError::TagNotFound(id.to_string()));
        }
        Ok(())
    }

    // --- Entry operations ---

    fn save_entry(&self, entry: &Reconciled<'_>) -> Result<()> {
        let entry = entry.entry();
        validate_fields(entry)?;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut protected = entry.base_encrypted;
        for tag in &entry.tags {
            match Self::tag_encrypted(&tx, &tag.id)? {
                Some(encrypted) => protected |= encrypted,
                None => return Err(MurmurError::TagNotFound(tag.id.to_string())),
            }
        }
        // Checked against the committed tags, not the entry's snapshot.
        if protected {
            if let Some(name) = exposed_plaintext(entry) {
                return Err(MurmurError::Validation(format!(
                    "{} of a protected entry is plaintext without the deferred flag",
                    name
                )));
            }
        }

        let t = field_params(&entry.transcript);
        let e = field_params(&entry.enhanced_text);
        let a = field_params(&entry.analysis);
        let au = field_params(&entry.audio);

        tx.execute(
            r#"
            INSERT INTO entries (
                id, created_at, updated_at, base_encrypted,
                transcript_plain, transcript_cipher, transcript_sealed_with, transcript_deferred,
                enhanced_text_plain, enhanced_text_cipher, enhanced_text_sealed_with, enhanced_text_deferred,
                analysis_plain, analysis_cipher, analysis_sealed_with, analysis_deferred,
                audio_plain, audio_cipher, audio_sealed_with, audio_deferred
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                updated_at = excluded.updated_at,
                base_encrypted = excluded.base_encrypted,
                transcript_plain = excluded.transcript_plain,
                transcript_cipher = excluded.transcript_cipher,
                transcript_sealed_with = excluded.transcript_sealed_with,
                transcript_deferred = excluded.transcript_deferred,
                enhanced_text_plain = excluded.enhanced_text_plain,
                enhanced_text_cipher = excluded.enhanced_text_cipher,
                enhanced_text_sealed_with = excluded.enhanced_text_sealed_with,
                enhanced_text_deferred = excluded.enhanced_text_deferred,
                analysis_plain = excluded.analysis_plain,
                analysis_cipher = excluded.analysis_cipher,
                analysis_sealed_with = excluded.analysis_sealed_with,
                analysis_deferred = excluded.analysis_deferred,
                audio_plain = excluded.audio_plain,
                audio_cipher = excluded.audio_cipher,
                audio_sealed_with = excluded.audio_sealed_with,
                audio_deferred = excluded.audio_deferred
            "#,
            params![
                entry.id.to_string(),
                entry.created_at.to_rfc3339(),
                entry.updated_at.to_rfc3339(),
                entry.base_encrypted,
                t.0, t.1, t.2, t.3,
                e.0, e.1, e.2, e.3,
                a.0, a.1, a.2, a.3,
                au.0, au.1, au.2, au.3,
            ],
        )?;

        tx.execute(
            "DELETE FROM entry_tags WHERE entry_id = ?",
            [entry.id.to_string()],
        )?;
        for (position, tag) in entry.tags.iter().enumerate() {
            tx.execute(
                "INSERT INTO entry_tags (entry_id, tag_id, position) VALUES (?, ?, ?)",
                params![entry.id.to_string(), tag.id.to_string(), position as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_entry(&self, id: &Uuid) -> Result<Option<Entry>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM entries e WHERE e.id = ?", ENTRY_COLUMNS),
                [id.to_string()],
                EntryRow::from_row,
            )
            .optional()?;

        row.map(|row| Self::entry_from_row(&conn, row)).transpose()
    }

    fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>> {
        let conn = self.lock_conn()?;

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(tag_id) = filter.tag_id {
            conditions.push(
                "EXISTS (SELECT 1 FROM entry_tags et WHERE et.entry_id = e.id AND et.tag_id = ?)"
                    .to_string(),
            );
            params.push(Box::new(tag_id.to_string()));
        }

        if filter.deferred_only {
            conditions.push(
                "(e.transcript_deferred = 1 OR e.enhanced_text_deferred = 1 OR e.analysis_deferred = 1 OR e.audio_deferred = 1)"
                    .to_string(),
            );
        }

        let mut sql = format!("SELECT {} FROM entries e", ENTRY_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY e.created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter()),
            EntryRow::from_row,
        )?;

        let mut raw = Vec::new();
        for row in rows {
            raw.push(row?);
        }
        drop(stmt);

        raw.into_iter()
            .map(|row| Self::entry_from_row(&conn, row))
            .collect()
    }

    fn check_integrity(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        let quick: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if quick != "ok" {
            return Err(MurmurError::Storage(format!(
                "SQLite integrity check failed: {}",
                quick
            )));
        }

        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        if rows.next()?.is_some() {
            return Err(MurmurError::Storage(
                "Foreign key integrity check failed".to_string(),
            ));
        }
        drop(rows);
        drop(stmt);

        let metadata_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM meta WHERE key IN ('format_version', 'journal_id', 'created_at')",
            [],
            |row| row.get(0),
        )?;
        if metadata_count < 3 {
            return Err(MurmurError::Storage(
                "Metadata table missing required keys".to_string(),
            ));
        }

        // Ciphertext must always name the key it was sealed under.
        let unnamed_cipher: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM entries WHERE
                (transcript_cipher IS NOT NULL AND transcript_sealed_with IS NULL) OR
                (enhanced_text_cipher IS NOT NULL AND enhanced_text_sealed_with IS NULL) OR
                (analysis_cipher IS NOT NULL AND analysis_sealed_with IS NULL) OR
                (audio_cipher IS NOT NULL AND audio_sealed_with IS NULL)
            "#,
            [],
            |row| row.get(0),
        )?;
        if unnamed_cipher > 0 {
            return Err(MurmurError::Storage(format!(
                "{} entries hold ciphertext without a key identifier",
                unnamed_cipher
            )));
        }

        let stray_deferred: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM entries WHERE
                (transcript_deferred = 1 AND transcript_plain IS NULL) OR
                (enhanced_text_deferred = 1 AND enhanced_text_plain IS NULL) OR
                (analysis_deferred = 1 AND analysis_plain IS NULL) OR
                (audio_deferred = 1 AND audio_plain IS NULL)
            "#,
            [],
            |row| row.get(0),
        )?;
        if stray_deferred > 0 {
            return Err(MurmurError::Storage(format!(
                "{} entries are flagged deferred without plaintext",
                stray_deferred
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_salt, hash_pin};
    use crate::secrets::KeyIdentifier;
    use tempfile::tempdir;

    fn credential_for(tag: &Tag) -> TagCredential {
        let salt = generate_salt().unwrap().to_vec();
        TagCredential {
            pin_hash: hash_pin("1234", &salt),
            pin_salt: salt,
            key_identifier: KeyIdentifier::for_tag(&tag.id),
        }
    }

    #[test]
    fn test_create_and_open_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.db");

        let journal_id = SqliteStorage::create(&path).unwrap();
        let storage = SqliteStorage::open(&path).unwrap();

        let metadata = storage.metadata().unwrap();
        assert_eq!(metadata.journal_id, journal_id);
        assert_eq!(metadata.format_version, FORMAT_VERSION);
        storage.check_integrity().unwrap();
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.db");
        SqliteStorage::create(&path).unwrap();

        assert!(matches!(
            SqliteStorage::create(&path),
            Err(MurmurError::Storage(_))
        ));
    }

    #[test]
    fn test_open_missing_journal() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SqliteStorage::open(&dir.path().join("missing.db")),
            Err(MurmurError::JournalNotFound)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_journal_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.db");
        SqliteStorage::create(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_tag_names_are_unique_case_insensitive() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.create_tag(&Tag::new("Private")).unwrap();

        assert!(matches!(
            storage.create_tag(&Tag::new("private")),
            Err(MurmurError::Validation(_))
        ));
        assert!(storage.get_tag_by_name("PRIVATE").unwrap().is_some());
    }

    #[test]
    fn test_empty_tag_name_is_rejected() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.create_tag(&Tag::new("  ")),
            Err(MurmurError::Validation(_))
        ));
    }

    #[test]
    fn test_credential_set_and_clear() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let tag = Tag::new("Private");
        storage.create_tag(&tag).unwrap();
        let credential = credential_for(&tag);

        storage
            .update_tag_credential(&tag.id, Some(&credential))
            .unwrap();
        let loaded = storage.get_tag(&tag.id).unwrap().unwrap();
        assert_eq!(loaded.credential.as_ref(), Some(&credential));

        storage.update_tag_credential(&tag.id, None).unwrap();
        assert!(!storage.get_tag(&tag.id).unwrap().unwrap().is_encrypted());
    }

    #[test]
    fn test_credential_update_for_unknown_tag() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.update_tag_credential(&Uuid::new_v4(), None),
            Err(MurmurError::TagNotFound(_))
        ));
    }

    #[test]
    fn test_entry_round_trip_preserves_fields_and_tag_order() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let first = Tag::new("first");
        let second = Tag::new("second");
        storage.create_tag(&first).unwrap();
        storage.create_tag(&second).unwrap();

        let mut entry = Entry::new(true);
        entry.attach_tag(EntryTag::from(&second));
        entry.attach_tag(EntryTag::from(&first));
        entry.transcript.set_text("plain words");
        entry.transcript.mark_deferred(true);
        entry.analysis = ProtectedField::from_parts(
            None,
            Some(vec![7; 40]),
            Some(KeyIdentifier::root()),
            false,
        );

        storage.save_entry(&Reconciled::new(&entry)).unwrap();
        let loaded = storage.get_entry(&entry.id).unwrap().unwrap();

        assert_eq!(loaded.transcript, entry.transcript);
        assert_eq!(loaded.analysis, entry.analysis);
        assert!(loaded.audio.is_empty());
        assert_eq!(
            loaded.tags.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[test]
    fn test_loaded_tag_snapshot_follows_credential() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let tag = Tag::new("Private");
        storage.create_tag(&tag).unwrap();
        let mut entry = Entry::new(false);
        entry.attach_tag(EntryTag::from(&tag));
        storage.save_entry(&Reconciled::new(&entry)).unwrap();

        storage
            .update_tag_credential(&tag.id, Some(&credential_for(&tag)))
            .unwrap();

        let loaded = storage.get_entry(&entry.id).unwrap().unwrap();
        assert!(loaded.tags[0].encrypted);
    }

    #[test]
    fn test_save_rejects_unknown_tag() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut entry = Entry::new(true);
        entry.attach_tag(EntryTag::from(&Tag::new("ghost")));

        assert!(matches!(
            storage.save_entry(&Reconciled::new(&entry)),
            Err(MurmurError::TagNotFound(_))
        ));
        assert!(storage.get_entry(&entry.id).unwrap().is_none());
    }

    #[test]
    fn test_save_rejects_unflagged_plaintext_under_protection() {
        let storage = SqliteStorage::open_in_memory().unwrap();

        let mut base = Entry::new(true);
        base.transcript.set_text("exposed");
        assert!(matches!(
            storage.save_entry(&Reconciled::new(&base)),
            Err(MurmurError::Validation(_))
        ));

        // The snapshot still says "not encrypted"; the committed tag wins.
        let tag = Tag::new("Private");
        storage.create_tag(&tag).unwrap();
        let mut entry = Entry::new(false);
        entry.attach_tag(EntryTag::from(&tag));
        entry.transcript.set_text("exposed");
        storage
            .update_tag_credential(&tag.id, Some(&credential_for(&tag)))
            .unwrap();

        assert!(matches!(
            storage.save_entry(&Reconciled::new(&entry)),
            Err(MurmurError::Validation(_))
        ));
        assert!(storage.get_entry(&entry.id).unwrap().is_none());

        entry.transcript.mark_deferred(true);
        storage.save_entry(&Reconciled::new(&entry)).unwrap();
    }

    #[test]
    fn test_save_replaces_existing_entry() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let tag = Tag::new("work");
        storage.create_tag(&tag).unwrap();

        let mut entry = Entry::new(false);
        entry.attach_tag(EntryTag::from(&tag));
        entry.transcript.set_text("v1");
        storage.save_entry(&Reconciled::new(&entry)).unwrap();

        entry.detach_tag(&tag.id);
        entry.transcript.set_text("v2");
        storage.save_entry(&Reconciled::new(&entry)).unwrap();

        let loaded = storage.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(loaded.transcript.plaintext(), Some(b"v2".as_slice()));
        assert!(loaded.tags.is_empty());
        assert_eq!(storage.list_entries(&EntryFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_list_entries_filters() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let tag = Tag::new("work");
        storage.create_tag(&tag).unwrap();

        let mut tagged = Entry::new(false);
        tagged.attach_tag(EntryTag::from(&tag));
        storage.save_entry(&Reconciled::new(&tagged)).unwrap();

        let mut deferred = Entry::new(true);
        deferred.transcript.set_text("pending");
        deferred.transcript.mark_deferred(true);
        storage.save_entry(&Reconciled::new(&deferred)).unwrap();

        let by_tag = storage
            .list_entries(&EntryFilter::new().tag(tag.id))
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].id, tagged.id);

        let pending = storage
            .list_entries(&EntryFilter::new().deferred_only())
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, deferred.id);

        let limited = storage.list_entries(&EntryFilter::new().limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.db");
        SqliteStorage::create(&path).unwrap();

        let mut entry = Entry::new(false);
        entry.enhanced_text.set_text("kept");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.save_entry(&Reconciled::new(&entry)).unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        let loaded = storage.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(loaded.enhanced_text.plaintext(), Some(b"kept".as_slice()));
    }
}
