use crate::app::{with_pin_retry, AppContext};
use crate::cli::TagCommand;
use crate::errors::{classify, CliError};
use crate::helpers::{confirm, prompt_new_pin};
use crate::output::{print_tag_list, tags_json};

pub fn handle_tag(ctx: &AppContext<'_>, command: &TagCommand) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;

    match command {
        TagCommand::Create { name } => {
            let tag = journal.create_tag(name).map_err(classify)?;
            if !ctx.quiet() {
                println!("Created tag {}", tag.name);
            }
        }
        TagCommand::List { json } => {
            let tags = journal.list_tags().map_err(classify)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&tags_json(&tags, &journal))?);
            } else {
                print_tag_list(&tags, &journal);
            }
        }
        TagCommand::Protect { name } => {
            let tag = journal.tag_by_name(name).map_err(classify)?;
            if tag.is_encrypted() {
                return Err(CliError::invalid_input(format!(
                    "Tag '{}' is already PIN-protected. Run `murmur tag unprotect` first to change its PIN.",
                    tag.name
                ))
                .into());
            }
            let pin = prompt_new_pin(&tag.name)?;
            let protection = journal.protect_tag(&tag.id, &pin).map_err(classify)?;
            if !ctx.quiet() {
                println!(
                    "Protected tag {} ({} entries sealed under its key)",
                    protection.tag.name, protection.resealed
                );
            }
        }
        TagCommand::Unprotect { name } => {
            let tag = journal.tag_by_name(name).map_err(classify)?;
            if !tag.is_encrypted() {
                return Err(CliError::invalid_input(format!(
                    "Tag '{}' is not PIN-protected.",
                    tag.name
                ))
                .into());
            }
            let release =
                with_pin_retry(ctx, &tag, |pin| journal.remove_tag_encryption(&tag.id, pin))?;
            if !ctx.quiet() {
                println!(
                    "Removed PIN from {} ({} entries moved to the root key)",
                    release.tag.name, release.reprotected
                );
            }
        }
        TagCommand::Forget { name, yes } => {
            let tag = journal.tag_by_name(name).map_err(classify)?;
            if !tag.is_encrypted() {
                return Err(CliError::invalid_input(format!(
                    "Tag '{}' is not PIN-protected.",
                    tag.name
                ))
                .into());
            }
            let prompt = format!(
                "Forget the PIN of '{}'? Entries sealed under it become permanently unreadable.",
                tag.name
            );
            if !confirm(&prompt, *yes)? {
                return Err(anyhow::anyhow!("Cancelled"));
            }
            let forgotten = journal
                .clear_tag_encryption_destructive(&tag.id)
                .map_err(classify)?;
            if !ctx.quiet() {
                println!("Forgot the PIN of {}", forgotten.tag.name);
                if forgotten.lost_entries > 0 {
                    println!(
                        "{} entries keep content that can no longer be read.",
                        forgotten.lost_entries
                    );
                }
            }
        }
    }
    Ok(())
}
