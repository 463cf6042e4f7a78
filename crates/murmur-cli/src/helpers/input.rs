//! Input helpers: PIN prompts, text bodies, entry references.

use std::io::{IsTerminal, Read};

use dialoguer::{Confirm, Password};
use murmur_core::{EntryFilter, Journal};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::constants::env;
use crate::errors::{classify, CliError};

/// PIN from MURMUR_PIN, if set.
pub fn env_pin() -> Option<Zeroizing<String>> {
    std::env::var(env::PIN)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Zeroizing::new)
}

/// Prompt for an existing tag PIN.
pub fn prompt_pin(tag_name: &str) -> anyhow::Result<Zeroizing<String>> {
    Password::new()
        .with_prompt(format!("PIN for {}", tag_name))
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("Failed to read PIN: {}", e))
}

/// Prompt for a new tag PIN with confirmation, or read it from MURMUR_PIN.
pub fn prompt_new_pin(tag_name: &str) -> anyhow::Result<Zeroizing<String>> {
    if let Some(pin) = env_pin() {
        return Ok(pin);
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No PIN provided and no TTY available. Set MURMUR_PIN."
        ));
    }
    Password::new()
        .with_prompt(format!("New PIN for {}", tag_name))
        .with_confirmation("Confirm PIN", "PINs do not match")
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("Failed to read PIN: {}", e))
}

/// Text from an argument, or from stdin when the argument is absent.
pub fn read_text(value: Option<String>, what: &str) -> anyhow::Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    if std::io::stdin().is_terminal() {
        return Err(CliError::invalid_input(format!(
            "No {} given. Pass it as an argument or pipe it on stdin.",
            what
        ))
        .into());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to read {} from stdin: {}", what, e))?;
    let trimmed = buffer.trim_end_matches(['\n', '\r']);
    if trimmed.trim().is_empty() {
        return Err(CliError::invalid_input(format!("The {} is empty.", what)).into());
    }
    Ok(trimmed.to_string())
}

/// Ask before a destructive action; `--yes` skips the question.
pub fn confirm(prompt: &str, assume_yes: bool) -> anyhow::Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::invalid_input(
            "Refusing to continue without confirmation. Pass --yes.",
        )
        .into());
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read confirmation: {}", e))
}

/// Resolve a full entry ID or a unique ID prefix.
pub fn resolve_entry_id(journal: &Journal, reference: &str) -> anyhow::Result<Uuid> {
    let reference = reference.trim();
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    if reference.is_empty() {
        return Err(CliError::invalid_input("Entry ID must not be empty.").into());
    }

    let needle = reference.to_ascii_lowercase();
    let matches: Vec<Uuid> = journal
        .list_entries(&EntryFilter::new())
        .map_err(classify)?
        .into_iter()
        .map(|entry| entry.id)
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(CliError::not_found(
            format!("No entry matches '{}'", reference),
            "Hint: Run `murmur list` to find entry IDs.",
        )
        .into()),
        _ => Err(CliError::invalid_input(format!(
            "'{}' matches {} entries; use a longer prefix.",
            reference,
            matches.len()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use murmur_core::secrets::MemorySecretStore;
    use murmur_core::storage::SqliteStorage;
    use murmur_core::JournalConfig;

    fn journal_with_entries(count: usize) -> (Journal, Vec<Uuid>) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let journal = Journal::new(
            storage,
            Arc::new(MemorySecretStore::new()),
            JournalConfig::default(),
        );
        let ids = (0..count)
            .map(|i| {
                let mut entry = journal.new_entry();
                entry.transcript.set_text(&format!("entry {}", i));
                journal.save_entry(&mut entry).unwrap();
                entry.id
            })
            .collect();
        (journal, ids)
    }

    #[test]
    fn test_full_id_resolves_without_lookup() {
        let (journal, _) = journal_with_entries(0);
        let id = Uuid::new_v4();
        assert_eq!(resolve_entry_id(&journal, &id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let (journal, ids) = journal_with_entries(1);
        let prefix = &ids[0].to_string()[..8];
        assert_eq!(resolve_entry_id(&journal, prefix).unwrap(), ids[0]);
    }

    #[test]
    fn test_unknown_prefix_is_not_found() {
        let (journal, _) = journal_with_entries(2);
        let err = resolve_entry_id(&journal, "zzzz").unwrap_err();
        let cli_err = err.downcast_ref::<CliError>().unwrap();
        assert!(matches!(cli_err, CliError::NotFound { .. }));
    }

    #[test]
    fn test_confirm_with_yes() {
        assert!(confirm("Really?", true).unwrap());
    }
}
