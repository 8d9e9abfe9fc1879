//! `ref-fetch fetch` command

use std::process::ExitCode;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};

use crate::cli::FetchArgs;
use crate::commands::fatal;
use ref_fetch::cache::CacheStore;
use ref_fetch::core::{Ecosystem, FetchOutcome, ManifestEntry};
use ref_fetch::ops::{Capabilities, FetchOptions, FetchOrchestrator, FetchReporter};
use ref_fetch::util::fs::write_string;
use ref_fetch::util::shell::{Progress, Shell, Status};
use ref_fetch::util::GlobalContext;

pub fn execute(args: FetchArgs, shell: &Arc<Shell>) -> Result<ExitCode> {
    let ctx = GlobalContext::new()?;

    let ecosystem: Ecosystem = match args.ecosystem.parse() {
        Ok(ecosystem) => ecosystem,
        Err(e) => return Ok(fatal(shell, &e)),
    };
    let root = ctx.project_root(args.path.as_deref());

    // Configuration (global + project), then flags on top
    let mut config = ctx.load_config(&root)?;
    if args.offline {
        config.net.offline = true;
    }
    if args.allow_default_branch {
        config.locator.allow_default_branch = true;
    }
    if args.jobs.is_some() {
        config.net.jobs = args.jobs;
    }
    if args.timeout.is_some() {
        config.net.run_timeout = args.timeout;
    }
    if args.no_export {
        config.export.enabled = Some(false);
    }
    if let Some(dir) = args.export_dir {
        config.export.enabled = Some(true);
        config.export.dir = Some(dir);
    }
    if args.no_stdlib {
        config.toolchain.include = Some(false);
    }

    let cache_root = ctx.cache_root(&config, args.cache_dir.as_deref());
    let cache = Arc::new(
        CacheStore::open(&cache_root)
            .with_context(|| format!("failed to open cache at {}", cache_root.display()))?,
    );

    let capabilities = if config.net.offline {
        Capabilities::offline(Arc::clone(&cache))
    } else {
        Capabilities::network(&config)?
    };
    let orchestrator = FetchOrchestrator::new(cache, capabilities, &config);

    let mut options = FetchOptions::from_config(&config);
    options.force = args.force;
    if let Err(e) = options.cancel.cancel_on_interrupt() {
        tracing::warn!("Ctrl-C will not cancel this run: {}", e);
    }

    let reporter = ShellReporter::new(shell);
    let span = shell.span(
        Status::Fetching,
        format!("{} dependencies of {}", ecosystem, root.display()),
    );
    let manifest = match orchestrator.run_with_reporter(ecosystem, &root, &options, &reporter) {
        Ok(manifest) => manifest,
        Err(e) => return Ok(fatal(shell, &e)),
    };
    reporter.finish();

    if let Some(path) = &args.manifest_out {
        write_string(path, &manifest.to_json()?)?;
    }

    if shell.is_json() {
        shell.event("fetch-manifest", serde_json::json!({ "manifest": manifest }));
    } else {
        if let Some(dir) = &options.export_dir {
            let exported = manifest
                .entries()
                .iter()
                .filter(|e| e.exported_to.is_some())
                .count();
            if exported > 0 {
                shell.status(
                    Status::Exported,
                    format!("{} sources to {}", exported, root.join(dir).display()),
                );
            }
        }
        let status = if manifest.has_failures() {
            Status::Failed
        } else {
            Status::Finished
        };
        span.finish_with_message(status, manifest.summary());
    }

    Ok(ExitCode::from(manifest.exit_code() as u8))
}

/// Shows per-dependency results as they complete.
struct ShellReporter {
    shell: Arc<Shell>,
    progress: OnceLock<Progress>,
}

impl ShellReporter {
    fn new(shell: &Arc<Shell>) -> Self {
        ShellReporter {
            shell: Arc::clone(shell),
            progress: OnceLock::new(),
        }
    }

    fn finish(&self) {
        if let Some(progress) = self.progress.get() {
            progress.finish();
        }
    }
}

impl FetchReporter for ShellReporter {
    fn started(&self, total: usize) {
        let _ = self
            .progress
            .set(self.shell.progress(total, "Fetching"));
    }

    fn finished(&self, entry: &ManifestEntry) {
        let status = Status::for_outcome(entry.outcome);
        let line = match entry.outcome {
            FetchOutcome::Fetched | FetchOutcome::AlreadyCached => format!(
                "{} {}",
                entry.dependency,
                entry.version.as_deref().unwrap_or("-")
            ),
            FetchOutcome::NotFound | FetchOutcome::Failed => entry.detail.clone(),
        };

        match self.progress.get() {
            Some(progress) => {
                progress.println(status, line);
                progress.inc(&entry.dependency);
            }
            None => self.shell.status(status, line),
        }
    }
}
