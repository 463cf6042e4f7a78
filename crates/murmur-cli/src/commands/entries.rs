use std::sync::Arc;

use murmur_core::enrichment::{Enrichment, EnrichmentWorker, DEFAULT_QUEUE_DEPTH};
use murmur_core::EntryFilter;

use crate::app::{unlock_tags, AppContext};
use crate::cli::{AddArgs, EnrichArgs, ListArgs, ShowArgs};
use crate::errors::{classify, CliError};
use crate::helpers::{read_text, resolve_entry_id};
use crate::output::{
    entries_json, entry_json, print_entry, print_entry_list, print_report, short_id,
};

pub fn handle_add(ctx: &AppContext<'_>, args: &AddArgs) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;
    unlock_tags(ctx, &journal, &args.unlock.tags)?;

    let transcript = read_text(args.transcript.clone(), "transcript")?;
    let mut entry = journal.new_entry();
    if args.no_base_encryption {
        entry.base_encrypted = false;
    }
    for name in &args.tag {
        let tag = journal.tag_by_name(name).map_err(classify)?;
        journal.assign_tag(&mut entry, &tag.id).map_err(classify)?;
    }
    entry.transcript.set_text(&transcript);
    if let Some(path) = args.audio.as_deref() {
        let bytes = std::fs::read(path)
            .map_err(|e| CliError::invalid_input(format!("Failed to read audio {}: {}", path, e)))?;
        entry.audio.set_bytes(bytes);
    }

    let report = journal.save_entry(&mut entry).map_err(classify)?;
    if !ctx.quiet() {
        println!("Saved entry {} ({})", short_id(&entry), entry.id);
        print_report(&report);
    }
    Ok(())
}

pub fn handle_enrich(ctx: &AppContext<'_>, args: &EnrichArgs) -> anyhow::Result<()> {
    if args.enhanced.is_none() && args.analysis.is_none() {
        return Err(
            CliError::invalid_input("Nothing to add. Pass --enhanced and/or --analysis.").into(),
        );
    }

    let journal = ctx.open_journal()?;
    let entry_id = resolve_entry_id(&journal, &args.id)?;
    unlock_tags(ctx, &journal, &args.unlock.tags)?;

    let mut enrichment = Enrichment::new(entry_id);
    if let Some(text) = args.enhanced.as_deref() {
        enrichment = enrichment.enhanced_text(text);
    }
    if let Some(text) = args.analysis.as_deref() {
        enrichment = enrichment.analysis(text);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(async move {
        let (handle, worker) = EnrichmentWorker::spawn(Arc::new(journal), DEFAULT_QUEUE_DEPTH);
        let result = handle.submit(enrichment).await;
        drop(handle);
        if let Err(err) = worker.await {
            tracing::warn!(error = %err, "enrichment worker did not shut down cleanly");
        }
        result
    });
    let report = report.map_err(classify)?;

    if !ctx.quiet() {
        println!("Enriched entry {}", entry_id);
        print_report(&report);
    }
    Ok(())
}

pub fn handle_show(ctx: &AppContext<'_>, args: &ShowArgs) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;
    let entry_id = resolve_entry_id(&journal, &args.id)?;
    unlock_tags(ctx, &journal, &args.unlock.tags)?;
    let entry = journal.load_entry(&entry_id).map_err(classify)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entry_json(&entry, &journal)?)?
        );
    } else {
        print_entry(&entry, &journal)?;
    }
    Ok(())
}

pub fn handle_list(ctx: &AppContext<'_>, args: &ListArgs) -> anyhow::Result<()> {
    let journal = ctx.open_journal()?;

    let mut filter = EntryFilter::new();
    if let Some(name) = args.tag.as_deref() {
        let tag = journal.tag_by_name(name).map_err(classify)?;
        filter = filter.tag(tag.id);
    }
    if args.deferred {
        filter = filter.deferred_only();
    }
    if let Some(limit) = args.limit {
        filter = filter.limit(limit);
    }

    let entries = journal.list_entries(&filter).map_err(classify)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries_json(&entries))?);
    } else {
        print_entry_list(&entries);
    }
    Ok(())
}
