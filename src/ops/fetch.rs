//! Implementation of `ref-fetch fetch`.
//!
//! A run reads the project's dependencies, merges duplicates and then
//! processes each dependency independently on a worker pool:
//!
//! 1. resolve a version
//! 2. serve it from the cache when an intact entry exists
//! 3. otherwise locate its source and fetch it into the cache
//!
//! One dependency's failure is recorded in the manifest and never affects
//! its siblings. Only problems with the project itself (unknown ecosystem,
//! missing or unreadable manifest) abort the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use rayon::prelude::*;

use crate::cache::{CacheError, CacheKey, CacheStore, PutOptions};
use crate::core::{
    Ecosystem, FetchError, FetchManifest, FetchOutcome, ManifestEntry, ResolvedDependency,
};
use crate::ecosystems::adapter_for;
use crate::locator::{LocateRequest, RepositoryLocator};
use crate::ops::export::export_entries;
use crate::resolver::{merge_requests, Requirement, VersionResolver};
use crate::sources::{
    ContentFetcher, GitProbe, HttpClient, HttpRegistry, NoNetwork, OfflineRegistry,
    PackageRegistry, RepositoryProbe, ReqwestClient, SourceFetcher,
};
use crate::util::cancel::CancellationToken;
use crate::util::config::Config;

/// The network capabilities a run works with.
#[derive(Clone)]
pub struct Capabilities {
    pub registry: Arc<dyn PackageRegistry>,
    pub probe: Arc<dyn RepositoryProbe>,
    pub fetcher: Arc<dyn ContentFetcher>,
    /// Serve from the cache only
    pub offline: bool,
}

impl Capabilities {
    /// Real registries, git remotes and archive downloads.
    pub fn network(config: &Config) -> anyhow::Result<Self> {
        let client: Arc<dyn HttpClient> = Arc::new(
            ReqwestClient::new(config.request_timeout(), &config.user_agent())
                .context("failed to set up the HTTP client")?,
        );
        let probe: Arc<dyn RepositoryProbe> = Arc::new(GitProbe::new());
        let registry = HttpRegistry::from_config(Arc::clone(&client), Arc::clone(&probe), config);

        Ok(Capabilities {
            registry: Arc::new(registry),
            probe,
            fetcher: Arc::new(SourceFetcher::new(client)),
            offline: false,
        })
    }

    /// Cache-backed capabilities that never touch the network.
    pub fn offline(cache: Arc<CacheStore>) -> Self {
        Capabilities {
            registry: Arc::new(OfflineRegistry::new(cache)),
            probe: Arc::new(NoNetwork),
            fetcher: Arc::new(NoNetwork),
            offline: true,
        }
    }
}

/// Options for a fetch run.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Worker threads (None = one per CPU)
    pub jobs: Option<usize>,

    /// Re-fetch entries that are already cached
    pub force: bool,

    /// Fetch the pinned toolchain's standard library too
    pub include_toolchain: bool,

    /// Re-hash cached entries before trusting them
    pub verify: bool,

    /// Export directory, relative to the project root (None = no export)
    pub export_dir: Option<PathBuf>,

    pub cancel: CancellationToken,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            jobs: None,
            force: false,
            include_toolchain: true,
            verify: true,
            export_dir: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl FetchOptions {
    /// Options as configured, before command-line overrides.
    pub fn from_config(config: &Config) -> Self {
        FetchOptions {
            jobs: config.net.jobs,
            force: false,
            include_toolchain: config.include_toolchain(),
            verify: config.verify_cache(),
            export_dir: config.export_enabled().then(|| config.export_dir()),
            cancel: match config.run_timeout() {
                Some(timeout) => CancellationToken::with_timeout(timeout),
                None => CancellationToken::new(),
            },
        }
    }
}

/// Receives progress while a run is in flight.
///
/// Called from worker threads.
pub trait FetchReporter: Sync {
    /// The number of unique dependencies about to be processed.
    fn started(&self, _total: usize) {}

    /// One dependency is done.
    fn finished(&self, _entry: &ManifestEntry) {}
}

/// Reporter that ignores everything.
pub struct NoopReporter;

impl FetchReporter for NoopReporter {}

/// Drives resolution, location and caching for one project.
pub struct FetchOrchestrator {
    cache: Arc<CacheStore>,
    resolver: VersionResolver,
    locator: RepositoryLocator,
    fetcher: Arc<dyn ContentFetcher>,
    offline: bool,
}

impl FetchOrchestrator {
    pub fn new(cache: Arc<CacheStore>, capabilities: Capabilities, config: &Config) -> Self {
        let locator = RepositoryLocator::from_config(
            Arc::clone(&capabilities.registry),
            capabilities.probe,
            config,
        );
        FetchOrchestrator {
            cache,
            resolver: VersionResolver::new(capabilities.registry),
            locator,
            fetcher: capabilities.fetcher,
            offline: capabilities.offline,
        }
    }

    /// Fetch every dependency of the project at `root`.
    pub fn run(
        &self,
        ecosystem: Ecosystem,
        root: &Path,
        options: &FetchOptions,
    ) -> Result<FetchManifest, FetchError> {
        self.run_with_reporter(ecosystem, root, options, &NoopReporter)
    }

    pub fn run_with_reporter(
        &self,
        ecosystem: Ecosystem,
        root: &Path,
        options: &FetchOptions,
        reporter: &dyn FetchReporter,
    ) -> Result<FetchManifest, FetchError> {
        let adapter = adapter_for(ecosystem);
        let mut requests = adapter.list_dependencies(root)?;
        if options.include_toolchain {
            if let Some(toolchain) = adapter.toolchain_request(root) {
                tracing::debug!("including toolchain {} {}", toolchain.name(), toolchain.constraint());
                requests.insert(0, toolchain);
            }
        }

        let requirements = merge_requests(ecosystem, &requests);
        tracing::info!(
            "Fetching {} {} dependencies ({} requested)",
            requirements.len(),
            ecosystem,
            requests.len()
        );
        reporter.started(requirements.len());

        let process = |req: &Requirement| {
            let entry = self.process(req, options);
            reporter.finished(&entry);
            entry
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs.unwrap_or(0))
            .thread_name(|i| format!("ref-fetch-{}", i))
            .build();
        let mut entries: Vec<ManifestEntry> = match pool {
            Ok(pool) => pool.install(|| requirements.par_iter().map(process).collect()),
            Err(e) => {
                tracing::warn!("failed to start worker pool ({}), fetching sequentially", e);
                requirements.iter().map(process).collect()
            }
        };

        if let Some(dir) = &options.export_dir {
            export_entries(ecosystem, &root.join(dir), &mut entries);
        }

        Ok(FetchManifest::new(ecosystem, root, entries))
    }

    /// Process one dependency, capturing its failure in the entry.
    fn process(&self, req: &Requirement, options: &FetchOptions) -> ManifestEntry {
        if options.cancel.is_cancelled() {
            let err = FetchError::Cancelled {
                package: req.name.clone(),
            };
            return ManifestEntry::from_error(&req.name, &req.constraint_text, None, &err);
        }

        let resolved = match self.resolver.resolve(req) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("{}", e);
                let mut entry = ManifestEntry::from_error(&req.name, &req.constraint_text, None, &e);
                if self.offline && e.is_not_found() {
                    entry.note("offline: only cached versions are available");
                }
                return entry;
            }
        };

        let version = resolved.version().as_str().to_string();
        match self.fetch_resolved(req, &resolved, options) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("{}", e);
                ManifestEntry::from_error(&req.name, &req.constraint_text, Some(version), &e)
            }
        }
    }

    fn fetch_resolved(
        &self,
        req: &Requirement,
        resolved: &ResolvedDependency,
        options: &FetchOptions,
    ) -> Result<ManifestEntry, FetchError> {
        let key = CacheKey::for_resolved(resolved);
        let version = resolved.version().as_str();
        let mut force = options.force;

        if !force && self.cache.has(&key) {
            let cached = if options.verify {
                self.cache.verify(&key)
            } else {
                self.cache.entry(&key)
            };
            match cached {
                Ok(entry) => {
                    tracing::debug!("{} served from cache", key);
                    return Ok(ManifestEntry::available(
                        &req.name,
                        &req.constraint_text,
                        version,
                        FetchOutcome::AlreadyCached,
                        entry.local_path,
                        entry.source,
                        entry.content_hash,
                    ));
                }
                Err(e @ CacheError::Corrupted { .. }) if self.offline => {
                    return Err(e.into_fetch_error(&req.name));
                }
                Err(CacheError::Corrupted { expected, actual, .. }) => {
                    tracing::warn!(
                        "{} is corrupted (expected {}, found {}), fetching it again",
                        key,
                        expected,
                        actual
                    );
                    force = true;
                }
                Err(e) => return Err(e.into_fetch_error(&req.name)),
            }
        }

        if self.offline {
            return Err(FetchError::LocationNotFound {
                package: req.name.clone(),
                version: version.to_string(),
                tried: vec![String::from("not in the cache (offline)")],
            });
        }

        let location = self.locator.locate(&LocateRequest {
            resolved,
            hint: req.repository.as_deref(),
            origin: req.origin,
        })?;

        let put_options = PutOptions {
            force,
            cancel: options.cancel.clone(),
        };
        let outcome = self
            .cache
            .put(&key, &location, self.fetcher.as_ref(), &put_options)
            .map_err(|e| e.into_fetch_error(&req.name))?;

        let result = if outcome.fetched {
            FetchOutcome::Fetched
        } else {
            FetchOutcome::AlreadyCached
        };
        Ok(ManifestEntry::available(
            &req.name,
            &req.constraint_text,
            version,
            result,
            outcome.entry.local_path,
            outcome.entry.source,
            outcome.entry.content_hash,
        ))
    }
}
