//! Text and table output formatting.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use murmur_core::{
    EncryptionCoordinator, EncryptionDomain, Entry, FieldName, Journal, ProtectionStatus,
    ReconcileReport, Revealed, SweepReport, Tag, WriteOutcome,
};

use super::json::{LOCKED_SENTINEL, UNREADABLE_SENTINEL};

/// `None` when the field's stored bytes cannot be decrypted or decoded.
///
/// Other errors are still returned so a broken store is not mistaken for
/// damaged content.
pub(crate) fn reveal_or_unreadable<T>(
    entry: &Entry,
    name: FieldName,
    revealed: murmur_core::Result<Revealed<T>>,
) -> anyhow::Result<Option<Revealed<T>>> {
    match revealed {
        Ok(revealed) => Ok(Some(revealed)),
        Err(err) if err.is_data_corruption() => {
            tracing::warn!(entry_id = %entry.id, field = %name, error = %err, "field is unreadable");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Storage state of one field, without revealing it.
pub fn field_state(entry: &Entry, name: FieldName) -> &'static str {
    let field = entry.field(name);
    if field.is_empty() {
        "empty"
    } else if field.is_deferred() {
        "deferred"
    } else if field.ciphertext().is_some() {
        "sealed"
    } else {
        "plaintext"
    }
}

pub fn short_id(entry: &Entry) -> String {
    entry.id.to_string()[..8].to_string()
}

/// Human label of the key governing an entry.
pub fn domain_label(entry: &Entry) -> String {
    match EncryptionCoordinator::domain_for(entry) {
        EncryptionDomain::Unprotected => "unprotected".to_string(),
        EncryptionDomain::Base => "root".to_string(),
        EncryptionDomain::Tag(tag_id) => entry
            .tags
            .iter()
            .find(|tag| tag.id == tag_id)
            .map(|tag| format!("tag:{}", tag.name))
            .unwrap_or_else(|| format!("tag:{}", tag_id)),
    }
}

fn tag_list(entry: &Entry) -> String {
    entry
        .tags
        .iter()
        .map(|tag| {
            if tag.encrypted {
                format!("{} (pin)", tag.name)
            } else {
                tag.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    table
}

pub fn print_tag_list(tags: &[Tag], journal: &Journal) {
    if tags.is_empty() {
        println!("No tags yet. Create one with `murmur tag create <NAME>`.");
        return;
    }
    let mut table = new_table(&["Name", "Protected", "Session", "Created"]);
    for tag in tags {
        let session = if !tag.is_encrypted() {
            "-"
        } else if journal.sessions().is_unlocked(&tag.id) {
            "unlocked"
        } else {
            "locked"
        };
        let protected = if tag.is_encrypted() { "yes" } else { "no" };
        table.add_row(vec![
            tag.name.clone(),
            protected.to_string(),
            session.to_string(),
            tag.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{table}");
}

pub fn print_entry_list(entries: &[Entry]) {
    if entries.is_empty() {
        println!("No entries found.");
        return;
    }
    let mut table = new_table(&["ID", "Created", "Tags", "Key", "Transcript"]);
    for entry in entries {
        let mut transcript = field_state(entry, FieldName::Transcript).to_string();
        if entry.has_deferred() && transcript != "deferred" {
            transcript.push_str(" (other fields deferred)");
        }
        table.add_row(vec![
            short_id(entry),
            entry.created_at.format("%Y-%m-%d %H:%M").to_string(),
            tag_list(entry),
            domain_label(entry),
            transcript,
        ]);
    }
    println!("{table}");
}

/// Print one entry with whatever content the current session can open.
pub fn print_entry(entry: &Entry, journal: &Journal) -> anyhow::Result<()> {
    println!("Entry {}", entry.id);
    println!("Created: {}", entry.created_at.to_rfc3339());
    println!("Updated: {}", entry.updated_at.to_rfc3339());
    if !entry.tags.is_empty() {
        println!("Tags: {}", tag_list(entry));
    }
    println!("Key: {}", domain_label(entry));

    for name in FieldName::ALL {
        let body = if name.is_text() {
            match reveal_or_unreadable(entry, name, journal.reveal_text(entry, name))? {
                Some(Revealed::Plain(text)) => text,
                Some(Revealed::Locked) => LOCKED_SENTINEL.to_string(),
                Some(Revealed::Empty) => continue,
                None => UNREADABLE_SENTINEL.to_string(),
            }
        } else {
            match reveal_or_unreadable(entry, name, journal.reveal(entry, name))? {
                Some(Revealed::Plain(bytes)) => format!("{} bytes", bytes.len()),
                Some(Revealed::Locked) => LOCKED_SENTINEL.to_string(),
                Some(Revealed::Empty) => continue,
                None => UNREADABLE_SENTINEL.to_string(),
            }
        };
        let marker = if entry.field(name).is_deferred() {
            " (awaiting encryption)"
        } else {
            ""
        };
        println!();
        println!("[{}]{}", name, marker);
        println!("{}", body);
    }
    Ok(())
}

fn outcome_label(outcome: WriteOutcome) -> &'static str {
    match outcome {
        WriteOutcome::Encrypted => "encrypted",
        WriteOutcome::DeferredPlaintext => "deferred until unlock",
        WriteOutcome::Locked => "sealed under a locked key",
        WriteOutcome::Unprotected => "stored unprotected",
        WriteOutcome::Unreadable => "unreadable, left as stored",
        WriteOutcome::Empty => "empty",
    }
}

/// Summarize how a save protected each non-empty field.
pub fn print_report(report: &ReconcileReport) {
    for (name, outcome) in &report.fields {
        if *outcome == WriteOutcome::Empty {
            continue;
        }
        println!("  {}: {}", name, outcome_label(*outcome));
    }
    if report.store_degraded {
        eprintln!("Warning: the key store was unavailable; content stays deferred.");
    }
}

pub fn print_sweep(report: &SweepReport) {
    println!("Examined: {}", report.examined);
    println!("Sealed: {}", report.upgraded);
    println!("Still pending: {}", report.still_pending);
    if report.failed > 0 {
        println!("Failed: {}", report.failed);
    }
    if report.unreadable > 0 {
        println!("With unreadable fields: {}", report.unreadable);
    }
}

pub fn print_status(status: &ProtectionStatus) {
    let mut table = new_table(&["", "Count"]);
    table.add_row(vec!["Entries".to_string(), status.entries.to_string()]);
    table.add_row(vec![
        "With deferred plaintext".to_string(),
        status.deferred_entries.to_string(),
    ]);
    table.add_row(vec![
        "Awaiting re-encryption".to_string(),
        status.rehome_pending.to_string(),
    ]);
    table.add_row(vec![
        "Lost with a forgotten PIN".to_string(),
        status.unrecoverable.to_string(),
    ]);
    table.add_row(vec![
        "PIN-protected tags".to_string(),
        status.encrypted_tags.to_string(),
    ]);
    table.add_row(vec![
        "Unlocked this session".to_string(),
        status.unlocked_tags.to_string(),
    ]);
    println!("{table}");
    if status.is_fully_protected() {
        println!("All content is protected.");
    } else {
        println!("Some content is waiting for a key. Run `murmur sweep --unlock <TAG>`.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::storage::EntryTag;
    use uuid::Uuid;

    #[test]
    fn test_field_state() {
        let mut entry = Entry::new(true);
        assert_eq!(field_state(&entry, FieldName::Transcript), "empty");
        entry.transcript.set_text("hi");
        assert_eq!(field_state(&entry, FieldName::Transcript), "plaintext");
    }

    #[test]
    fn test_domain_label_prefers_first_encrypted_tag() {
        let mut entry = Entry::new(true);
        assert_eq!(domain_label(&entry), "root");

        entry.attach_tag(EntryTag {
            id: Uuid::new_v4(),
            name: "Open".to_string(),
            encrypted: false,
        });
        entry.attach_tag(EntryTag {
            id: Uuid::new_v4(),
            name: "Private".to_string(),
            encrypted: true,
        });
        assert_eq!(domain_label(&entry), "tag:Private");

        let mut bare = Entry::new(false);
        bare.transcript.set_text("x");
        assert_eq!(domain_label(&bare), "unprotected");
    }
}
