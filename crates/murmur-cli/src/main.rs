//! Murmur CLI - a local voice journal with PIN-protected tags
//!
//! This is the command-line interface for Murmur. Each invocation is one
//! session: tags unlocked with `--unlock` stay unlocked only until the
//! command exits.

mod app;
mod cli;
mod commands;
mod config;
mod constants;
mod errors;
mod helpers;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::constants::env;
use crate::errors::CliError;

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    let ctx = AppContext::new(&cli);

    if let Err(err) = run(&ctx) {
        if let Some(cli_err) = err.downcast_ref::<CliError>() {
            cli_err.exit();
        }

        let message = format!("{:#}", err);
        eprintln!("Error: {}", message);
        if let Some(hint) = extract_error_hint(&message) {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(env::LOG)
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(ctx: &AppContext<'_>) -> anyhow::Result<()> {
    match &ctx.cli().command {
        Commands::Init(args) => commands::handle_init(ctx, args),
        Commands::Tag(command) => commands::handle_tag(ctx, command),
        Commands::Add(args) => commands::handle_add(ctx, args),
        Commands::Enrich(args) => commands::handle_enrich(ctx, args),
        Commands::Show(args) => commands::handle_show(ctx, args),
        Commands::List(args) => commands::handle_list(ctx, args),
        Commands::Sweep(args) => commands::handle_sweep(ctx, args),
        Commands::Status(args) => commands::handle_status(ctx, args),
        Commands::Check => commands::handle_check(ctx),
    }
}

/// Extract a hint from an error message, or suggest one for common
/// failures that reach here without a typed `CliError`.
fn extract_error_hint(error: &str) -> Option<String> {
    if error.contains("\nHint:") {
        return None;
    }

    let error_lower = error.to_lowercase();
    if error_lower.contains("decryption") {
        return Some(
            "Hint: Sealed data failed authentication. Run `murmur check` and restore from a backup if it fails."
                .to_string(),
        );
    }
    if error_lower.contains("secret store") || error_lower.contains("keychain") {
        return Some(
            "Hint: The key store is unavailable. Use `--backend keyfile` at init on systems without a keychain."
                .to_string(),
        );
    }
    if error_lower.contains("no tty") {
        return Some("Hint: Set MURMUR_PIN for non-interactive use.".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_for_decryption_failure() {
        let hint = extract_error_hint("Decryption failed: aead::Error").unwrap();
        assert!(hint.contains("murmur check"));
    }

    #[test]
    fn test_no_duplicate_hint() {
        assert!(extract_error_hint("Tag not found\nHint: Run `murmur tag list`").is_none());
    }

    #[test]
    fn test_no_hint_for_unknown_errors() {
        assert!(extract_error_hint("something else").is_none());
    }
}
