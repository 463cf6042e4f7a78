use std::path::PathBuf;

use murmur_core::secrets::provision_root_key;
use murmur_core::storage::SqliteStorage;
use murmur_core::StorageEngine;

use crate::app::{open_secret_store, resolve_config_path, AppContext};
use crate::cli::InitArgs;
use crate::config::{default_journal_path, write_config, MurmurConfig, SecretBackend};
use crate::errors::{classify, CliError};

pub fn handle_init(ctx: &AppContext<'_>, args: &InitArgs) -> anyhow::Result<()> {
    let journal_path = match args.path.as_deref().or(ctx.cli().journal.as_deref()) {
        Some(path) => PathBuf::from(path),
        None => default_journal_path()?,
    };
    let config_path = match args.config_path.as_deref() {
        Some(path) => PathBuf::from(path),
        None => resolve_config_path()?,
    };

    if journal_path.exists() {
        return Err(CliError::invalid_input(format!(
            "A journal already exists at {}",
            journal_path.display()
        ))
        .into());
    }
    if args.keyfile_dir.is_some() && args.backend != SecretBackend::Keyfile {
        return Err(
            CliError::invalid_input("--keyfile-dir requires --backend keyfile").into(),
        );
    }

    let journal_id = SqliteStorage::create(&journal_path).map_err(classify)?;

    let config = MurmurConfig::new(
        journal_path.clone(),
        args.backend,
        args.keyfile_dir.as_deref().map(PathBuf::from),
    );
    let secrets = open_secret_store(&config, &journal_path, journal_id)?;
    // Later commands find the key instead of racing to create it.
    if let Err(err) = provision_root_key(secrets.as_ref()) {
        tracing::warn!(error = %err, "root key not provisioned; the first save will retry");
    }
    write_config(&config_path, &config)?;
    tracing::info!(journal_id = %journal_id, "journal initialized");

    if !ctx.quiet() {
        println!("Created journal at {}", journal_path.display());
        println!("Config written to {}", config_path.display());
        if args.backend == SecretBackend::Keyfile {
            println!(
                "Warning: keys are stored as files in {}. Anyone who can read that directory can read unprotected entries.",
                config.keyfile_dir().display()
            );
        }
    }
    Ok(())
}
