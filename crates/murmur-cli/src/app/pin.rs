//! PIN handling with retry logic.

use std::io::IsTerminal;

use murmur_core::{Journal, MurmurError, Tag};

use crate::errors::{classify, CliError};
use crate::helpers::{env_pin, prompt_pin};

use super::context::AppContext;

/// Run `action` with a PIN for `tag`, re-prompting after a wrong PIN.
///
/// A PIN taken from MURMUR_PIN gets a single attempt.
pub fn with_pin_retry<T>(
    ctx: &AppContext<'_>,
    tag: &Tag,
    mut action: impl FnMut(&str) -> murmur_core::Result<T>,
) -> anyhow::Result<T> {
    if let Some(pin) = env_pin() {
        return match action(&pin) {
            Ok(value) => Ok(value),
            Err(MurmurError::AuthorizationFailure) => Err(CliError::auth_failed_with_hint(
                format!("Incorrect PIN for tag '{}'.", tag.name),
                "Hint: Check the MURMUR_PIN environment variable.",
            )
            .into()),
            Err(err) => Err(classify(err)),
        };
    }

    if !std::io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No PIN provided and no TTY available. Set MURMUR_PIN."
        ));
    }

    let max_attempts = ctx.max_pin_attempts()?;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let pin = prompt_pin(&tag.name)?;
        match action(&pin) {
            Ok(value) => return Ok(value),
            Err(MurmurError::AuthorizationFailure) => {
                tracing::debug!(tag_id = %tag.id, attempts, "wrong PIN");
                if attempts >= max_attempts {
                    return Err(CliError::auth_failed_with_hint(
                        "Too many incorrect PIN attempts.",
                        "Hint: If the PIN is lost, `murmur tag forget` resets the tag at the cost of its sealed entries.",
                    )
                    .into());
                }
                let remaining = max_attempts - attempts;
                eprintln!(
                    "Incorrect PIN. {} attempt{} remaining.",
                    remaining,
                    if remaining == 1 { "" } else { "s" }
                );
            }
            Err(err) => return Err(classify(err)),
        }
    }
}

/// Unlock each named tag for the lifetime of `journal`.
pub fn unlock_tags(ctx: &AppContext<'_>, journal: &Journal, names: &[String]) -> anyhow::Result<()> {
    for name in names {
        let tag = journal.tag_by_name(name).map_err(classify)?;
        if !tag.is_encrypted() {
            return Err(CliError::invalid_input(format!(
                "Tag '{}' is not PIN-protected; nothing to unlock.",
                tag.name
            ))
            .into());
        }
        with_pin_retry(ctx, &tag, |pin| journal.unlock_tag(&tag.id, pin))?;
        if !ctx.quiet() {
            eprintln!("Unlocked {}", tag.name);
        }
    }
    Ok(())
}
