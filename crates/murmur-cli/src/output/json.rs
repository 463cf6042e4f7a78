//! JSON output formatting.

use murmur_core::{
    EncryptionCoordinator, Entry, FieldName, Journal, ProtectionStatus, Revealed, SweepReport, Tag,
};

use super::text::{field_state, reveal_or_unreadable};

/// Placeholder for sealed content whose key is not available.
pub const LOCKED_SENTINEL: &str = "[locked]";

/// Placeholder for sealed content that fails to decrypt.
pub const UNREADABLE_SENTINEL: &str = "[unreadable]";

pub fn tag_json(tag: &Tag, unlocked: bool) -> serde_json::Value {
    serde_json::json!({
        "id": tag.id,
        "name": tag.name,
        "created_at": tag.created_at,
        "encrypted": tag.is_encrypted(),
        "unlocked": unlocked,
    })
}

pub fn tags_json(tags: &[Tag], journal: &Journal) -> Vec<serde_json::Value> {
    tags.iter()
        .map(|tag| tag_json(tag, journal.sessions().is_unlocked(&tag.id)))
        .collect()
}

/// Entry metadata without content.
pub fn entry_summary_json(entry: &Entry) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = FieldName::ALL
        .iter()
        .map(|name| (name.to_string(), field_state(entry, *name).into()))
        .collect();
    serde_json::json!({
        "id": entry.id,
        "created_at": entry.created_at,
        "updated_at": entry.updated_at,
        "base_encrypted": entry.base_encrypted,
        "domain": EncryptionCoordinator::domain_for(entry),
        "tags": entry.tags,
        "fields": fields,
    })
}

pub fn entries_json(entries: &[Entry]) -> Vec<serde_json::Value> {
    entries.iter().map(entry_summary_json).collect()
}

/// Entry with revealed content; locked and unreadable fields carry a sentinel.
pub fn entry_json(entry: &Entry, journal: &Journal) -> anyhow::Result<serde_json::Value> {
    let mut value = entry_summary_json(entry);
    let mut content = serde_json::Map::new();
    for name in FieldName::ALL {
        let revealed = if name.is_text() {
            match reveal_or_unreadable(entry, name, journal.reveal_text(entry, name))? {
                Some(Revealed::Plain(text)) => serde_json::Value::String(text),
                Some(Revealed::Locked) => LOCKED_SENTINEL.into(),
                Some(Revealed::Empty) => serde_json::Value::Null,
                None => UNREADABLE_SENTINEL.into(),
            }
        } else {
            match reveal_or_unreadable(entry, name, journal.reveal(entry, name))? {
                Some(Revealed::Plain(bytes)) => serde_json::json!({ "bytes": bytes.len() }),
                Some(Revealed::Locked) => LOCKED_SENTINEL.into(),
                Some(Revealed::Empty) => serde_json::Value::Null,
                None => UNREADABLE_SENTINEL.into(),
            }
        };
        content.insert(name.to_string(), revealed);
    }
    value["content"] = serde_json::Value::Object(content);
    Ok(value)
}

pub fn sweep_json(report: &SweepReport) -> serde_json::Value {
    serde_json::to_value(report).unwrap_or(serde_json::Value::Null)
}

pub fn status_json(status: &ProtectionStatus) -> serde_json::Value {
    let mut value = serde_json::to_value(status).unwrap_or(serde_json::Value::Null);
    value["fully_protected"] = status.is_fully_protected().into();
    value
}
