//! Path resolution for config and journal files.

use std::path::{Path, PathBuf};

use crate::config::default_config_path;
use crate::constants::env;

/// Resolve the config file path, checking MURMUR_CONFIG first.
pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var(env::CONFIG) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    default_config_path()
}

/// Error message when the journal file is missing.
pub fn missing_journal_message(path: &Path) -> String {
    format!(
        "No journal found at {}\n\nRun:\n  murmur init\n\nOr specify a journal path:\n  MURMUR_JOURNAL=/path/to/journal.db murmur init",
        path.display()
    )
}

/// Error message when the config file is missing.
pub fn missing_config_message(config_path: &Path) -> String {
    format!(
        "No config found at {}\n\nRun:\n  murmur init",
        config_path.display()
    )
}
