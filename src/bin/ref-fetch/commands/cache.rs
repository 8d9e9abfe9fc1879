//! `ref-fetch cache` command
//!
//! Inspect and maintain the source cache.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::{CacheArgs, CacheCommands, CacheSelection};
use crate::commands::fatal;
use ref_fetch::cache::{CacheFilter, CacheStore};
use ref_fetch::core::Ecosystem;
use ref_fetch::ops::{cache_usage, format_size, list_entries, verify_entries};
use ref_fetch::util::shell::{Shell, Status};
use ref_fetch::util::GlobalContext;

pub fn execute(args: CacheArgs, shell: &Arc<Shell>) -> Result<ExitCode> {
    let ctx = GlobalContext::new()?;
    let config = ctx.load_config(ctx.cwd())?;
    let root = ctx.cache_root(&config, args.cache_dir.as_deref());

    match args.command {
        CacheCommands::Path => {
            println!("{}", root.display());
            Ok(ExitCode::SUCCESS)
        }
        CacheCommands::List(selection) => with_filter(shell, &selection, |filter| list(shell, &root, filter)),
        CacheCommands::Size(selection) => with_filter(shell, &selection, |filter| size(shell, &root, filter)),
        CacheCommands::Verify(verify_args) => with_filter(shell, &verify_args.selection, |filter| {
            verify(shell, &root, filter, verify_args.repair)
        }),
        CacheCommands::Clean(selection) => with_filter(shell, &selection, |filter| clean(shell, &root, filter)),
    }
}

/// Parse the selection and run `f`, reporting an unknown ecosystem.
fn with_filter(
    shell: &Shell,
    selection: &CacheSelection,
    f: impl FnOnce(&CacheFilter) -> Result<ExitCode>,
) -> Result<ExitCode> {
    let ecosystem = match selection.ecosystem.as_deref().map(str::parse::<Ecosystem>) {
        Some(Err(e)) => return Ok(fatal(shell, &e)),
        Some(Ok(ecosystem)) => Some(ecosystem),
        None => None,
    };
    let filter = CacheFilter {
        ecosystem,
        name: selection.name.clone(),
        version: selection.version.clone(),
    };
    f(&filter)
}

fn open(root: &Path) -> Result<CacheStore> {
    CacheStore::open(root).with_context(|| format!("failed to open cache at {}", root.display()))
}

/// List cached entries.
fn list(shell: &Shell, root: &Path, filter: &CacheFilter) -> Result<ExitCode> {
    let store = open(root)?;
    let entries = list_entries(&store, filter);

    if shell.is_json() {
        for entry in &entries {
            let mut event = serde_json::to_value(entry)?;
            event["path"] = serde_json::to_value(&entry.local_path)?;
            shell.event("cache-entry", event);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if entries.is_empty() {
        shell.note(format!("no cached entries in {}", root.display()));
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &entries {
        println!(
            "{} {} {} ({})",
            entry.ecosystem,
            entry.name,
            entry.version,
            entry.source.describe()
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Show cache size.
fn size(shell: &Shell, root: &Path, filter: &CacheFilter) -> Result<ExitCode> {
    let store = open(root)?;
    let usage = cache_usage(&store, filter)?;

    if shell.is_json() {
        shell.event(
            "cache-size",
            serde_json::json!({ "entries": usage.entries, "bytes": usage.bytes }),
        );
    } else {
        println!("{} ({} entries)", format_size(usage.bytes), usage.entries);
    }
    Ok(ExitCode::SUCCESS)
}

/// Re-hash entries; exits with 2 when corruption was found.
fn verify(shell: &Arc<Shell>, root: &Path, filter: &CacheFilter, repair: bool) -> Result<ExitCode> {
    let store = open(root)?;
    let span = shell.span(Status::Verifying, format!("cache at {}", root.display()));
    let report = verify_entries(&store, filter, repair)?;

    for (key, problem) in &report.corrupted {
        shell.status(Status::Failed, problem);
        shell.event(
            "cache-corrupted",
            serde_json::json!({ "key": key.to_string(), "message": problem }),
        );
    }

    let mut summary = format!(
        "{} intact, {} corrupted",
        report.intact.len(),
        report.corrupted.len()
    );
    if repair {
        summary.push_str(&format!(", {} removed", report.removed));
    }
    let status = if report.is_clean() {
        Status::Finished
    } else {
        Status::Failed
    };
    span.finish_with_message(status, summary);

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Remove cached entries.
fn clean(shell: &Shell, root: &Path, filter: &CacheFilter) -> Result<ExitCode> {
    let store = open(root)?;
    let removed = store.clean(filter)?;

    if shell.is_json() {
        shell.event("cache-clean", serde_json::json!({ "removed": removed }));
    } else {
        shell.status(Status::Removed, format!("{} cache entries", removed));
    }
    Ok(ExitCode::SUCCESS)
}
