//! Row types for database queries.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use crate::error::{MurmurError, Result};
use crate::secrets::KeyIdentifier;
use crate::storage::types::{Entry, EntryTag, ProtectedField, Tag, TagCredential};

/// Column list matching `EntryRow::from_row`.
pub const ENTRY_COLUMNS: &str = "e.id, e.created_at, e.updated_at, e.base_encrypted, \
    e.transcript_plain, e.transcript_cipher, e.transcript_sealed_with, e.transcript_deferred, \
    e.enhanced_text_plain, e.enhanced_text_cipher, e.enhanced_text_sealed_with, e.enhanced_text_deferred, \
    e.analysis_plain, e.analysis_cipher, e.analysis_sealed_with, e.analysis_deferred, \
    e.audio_plain, e.audio_cipher, e.audio_sealed_with, e.audio_deferred";

/// Column list matching `TagRow::from_row`.
pub const TAG_COLUMNS: &str = "id, name, created_at, pin_hash, pin_salt, key_identifier";

/// Raw columns of one protected field.
#[derive(Debug)]
pub struct FieldRow {
    pub plain: Option<Vec<u8>>,
    pub cipher: Option<Vec<u8>>,
    pub sealed_with: Option<String>,
    pub deferred: bool,
}

impl FieldRow {
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            plain: row.get(offset)?,
            cipher: row.get(offset + 1)?,
            sealed_with: row.get(offset + 2)?,
            deferred: row.get(offset + 3)?,
        })
    }

    fn into_field(self, column: &str) -> Result<ProtectedField> {
        if self.plain.is_some() && self.cipher.is_some() {
            return Err(MurmurError::Storage(format!(
                "{} holds both plaintext and ciphertext",
                column
            )));
        }
        Ok(ProtectedField::from_parts(
            self.plain,
            self.cipher,
            self.sealed_with.map(KeyIdentifier::from_stored),
            self.deferred,
        ))
    }
}

/// Raw row data from the entries table, before parsing into domain types.
#[derive(Debug)]
pub struct EntryRow {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub base_encrypted: bool,
    pub transcript: FieldRow,
    pub enhanced_text: FieldRow,
    pub analysis: FieldRow,
    pub audio: FieldRow,
    pub tags: Vec<EntryTag>,
}

impl EntryRow {
    /// Read a row selected with `ENTRY_COLUMNS`. Tags are loaded separately.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            base_encrypted: row.get(3)?,
            transcript: FieldRow::from_row(row, 4)?,
            enhanced_text: FieldRow::from_row(row, 8)?,
            analysis: FieldRow::from_row(row, 12)?,
            audio: FieldRow::from_row(row, 16)?,
            tags: Vec::new(),
        })
    }
}

impl TryFrom<EntryRow> for Entry {
    type Error = MurmurError;

    fn try_from(row: EntryRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| MurmurError::Storage(format!("Invalid entry UUID: {}", e)))?;

        Ok(Entry {
            id,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            base_encrypted: row.base_encrypted,
            tags: row.tags,
            transcript: row.transcript.into_field("transcript")?,
            enhanced_text: row.enhanced_text.into_field("enhanced_text")?,
            analysis: row.analysis.into_field("analysis")?,
            audio: row.audio.into_field("audio")?,
        })
    }
}

/// Raw row data from the tags table.
#[derive(Debug)]
pub struct TagRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub pin_hash: Option<String>,
    pub pin_salt: Option<Vec<u8>>,
    pub key_identifier: Option<String>,
}

impl TagRow {
    /// Read a row selected with `TAG_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
            pin_hash: row.get(3)?,
            pin_salt: row.get(4)?,
            key_identifier: row.get(5)?,
        })
    }
}

impl TryFrom<TagRow> for Tag {
    type Error = MurmurError;

    fn try_from(row: TagRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| MurmurError::Storage(format!("Invalid tag UUID: {}", e)))?;

        let credential = match (row.pin_hash, row.pin_salt, row.key_identifier) {
            (Some(pin_hash), Some(pin_salt), Some(key_identifier)) => Some(TagCredential {
                pin_hash,
                pin_salt,
                key_identifier: KeyIdentifier::from_stored(key_identifier),
            }),
            (None, None, None) => None,
            _ => {
                return Err(MurmurError::Storage(format!(
                    "Tag {} has a partial credential",
                    id
                )))
            }
        };

        Ok(Tag {
            id,
            name: row.name,
            created_at: parse_timestamp(&row.created_at)?,
            credential,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MurmurError::Storage(format!("Invalid timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_row() -> TagRow {
        TagRow {
            id: Uuid::new_v4().to_string(),
            name: "Private".to_string(),
            created_at: Utc::now().to_rfc3339(),
            pin_hash: None,
            pin_salt: None,
            key_identifier: None,
        }
    }

    #[test]
    fn test_tag_row_without_credential() {
        let tag = Tag::try_from(tag_row()).unwrap();
        assert!(!tag.is_encrypted());
    }

    #[test]
    fn test_partial_credential_is_rejected() {
        let row = TagRow {
            pin_hash: Some("abcd".to_string()),
            ..tag_row()
        };
        assert!(matches!(Tag::try_from(row), Err(MurmurError::Storage(_))));
    }

    #[test]
    fn test_field_with_both_slots_is_rejected() {
        let field = FieldRow {
            plain: Some(b"a".to_vec()),
            cipher: Some(vec![0; 30]),
            sealed_with: Some("root".to_string()),
            deferred: false,
        };
        assert!(field.into_field("transcript").is_err());
    }
}
