//! Application context for the Murmur CLI.
//!
//! Bundles CLI arguments with the lazily-loaded config and knows how to
//! open the journal with the configured secret backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use murmur_core::secrets::{KeychainSecretStore, KeyfileSecretStore};
use murmur_core::storage::SqliteStorage;
use murmur_core::{Journal, JournalConfig, MurmurError, SecretStore, StorageEngine};
use uuid::Uuid;

use crate::cli::Cli;
use crate::config::{default_keyfile_dir, read_config, MurmurConfig, SecretBackend};
use crate::errors::{classify, CliError};

use super::resolver::{missing_config_message, missing_journal_message, resolve_config_path};

pub struct AppContext<'a> {
    cli: &'a Cli,
    config: OnceCell<MurmurConfig>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            config: OnceCell::new(),
        }
    }

    pub fn cli(&self) -> &Cli {
        self.cli
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    /// Load the config file once.
    ///
    /// A `--journal` override without a config file falls back to the
    /// default sections (keychain backend).
    pub fn config(&self) -> anyhow::Result<&MurmurConfig> {
        self.config.get_or_try_init(|| {
            let config_path = resolve_config_path()?;
            if config_path.exists() {
                return read_config(&config_path);
            }
            match self.cli.journal.as_deref() {
                Some(path) => Ok(MurmurConfig::new(
                    PathBuf::from(path),
                    SecretBackend::default(),
                    None,
                )),
                None => Err(CliError::not_found(
                    missing_config_message(&config_path),
                    "Hint: Run `murmur init` to create a journal.",
                )
                .into()),
            }
        })
    }

    /// Journal path from `--journal`/MURMUR_JOURNAL, else from the config.
    pub fn journal_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = self.cli.journal.as_deref() {
            return Ok(PathBuf::from(path));
        }
        Ok(PathBuf::from(&self.config()?.journal.path))
    }

    pub fn max_pin_attempts(&self) -> anyhow::Result<u32> {
        Ok(self.config()?.security.max_pin_attempts.max(1))
    }

    /// Open the journal with the configured secret backend.
    pub fn open_journal(&self) -> anyhow::Result<Journal> {
        let config = self.config()?;
        let path = self.journal_path()?;
        let storage = match SqliteStorage::open(&path) {
            Ok(storage) => storage,
            Err(MurmurError::JournalNotFound) => {
                return Err(CliError::not_found(
                    missing_journal_message(&path),
                    "Hint: Run `murmur init` to create one.",
                )
                .into())
            }
            Err(err) => return Err(classify(err)),
        };

        let secrets = open_secret_store(config, &path, storage.journal_id())?;

        let journal_config = JournalConfig {
            min_pin_length: config.security.min_pin_length,
            base_encrypted_by_default: config.security.base_encrypted_by_default,
        };
        tracing::debug!(path = %path.display(), backend = ?config.secrets.backend, "journal opened");

        let storage: Arc<dyn StorageEngine> = Arc::new(storage);
        Ok(Journal::new(storage, secrets, journal_config))
    }
}

/// Secret store for one journal, per the configured backend.
///
/// Keychain entries are scoped by the journal id; keyfiles live in the
/// configured directory or next to `journal_path`.
pub fn open_secret_store(
    config: &MurmurConfig,
    journal_path: &Path,
    journal_id: Uuid,
) -> anyhow::Result<Arc<dyn SecretStore>> {
    Ok(match config.secrets.backend {
        SecretBackend::Keychain => Arc::new(KeychainSecretStore::new(journal_id.to_string())),
        SecretBackend::Keyfile => {
            let dir = match config.secrets.keyfile_dir.as_deref() {
                Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
                _ => default_keyfile_dir(journal_path),
            };
            Arc::new(KeyfileSecretStore::open(dir).map_err(classify)?)
        }
    })
}
