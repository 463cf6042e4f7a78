use crate::app::{unlock_tags, AppContext};
use crate::cli::{StatusArgs, SweepArgs};
use crate::errors::{classify, CliError};
use crate::output::{print_status, print_sweep, status_json, sweep_json};

pub fn handle_sweep(ctx: &AppContext<'_>, args: &SweepArgs) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;
    unlock_tags(ctx, &journal, &args.unlock.tags)?;

    let report = journal.sweep_deferred().map_err(classify)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&sweep_json(&report))?);
    } else if !ctx.quiet() {
        print_sweep(&report);
    }
    Ok(())
}

pub fn handle_status(ctx: &AppContext<'_>, args: &StatusArgs) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;
    let status = journal.protection_status().map_err(classify)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status_json(&status))?);
    } else {
        print_status(&status);
    }
    Ok(())
}

pub fn handle_check(ctx: &AppContext<'_>) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;
    match journal.check_integrity() {
        Ok(()) => {
            if !ctx.quiet() {
                println!("Integrity check: OK");
                println!("- sqlite quick_check: OK");
                println!("- foreign keys: OK");
                println!("- metadata keys: OK");
                println!("- sealed field markers: OK");
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("Integrity check: FAILED");
            eprintln!("Hint: Restore from a backup before writing new entries.");
            Err(CliError::IntegrityFailed(err.to_string()).into())
        }
    }
}
