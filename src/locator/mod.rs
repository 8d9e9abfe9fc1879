//! Repository location.
//!
//! Maps a resolved dependency to the upstream repository and git reference
//! holding its source. Candidate repositories are tried in order:
//!
//! 1. a configured override
//! 2. the repository hint found in local metadata
//! 3. the registry's published repository links for the version
//! 4. naming conventions
//!
//! The first repository with a tag for the version wins. If none has one,
//! the registry's source archive is used, then (when allowed) the default
//! branch of the first reachable repository.

pub mod tags;
pub mod url;

pub use tags::TagPolicy;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use ::url::Url;

use crate::core::{
    Ecosystem, FetchError, GitReference, PinnedVersion, RequestOrigin, ResolvedDependency,
    SourceLocation, Stage,
};
use crate::ecosystems::toolchain::Toolchain;
use crate::resolver::VersionScheme;
use crate::sources::{PackageQuery, PackageRegistry, RepositoryProbe, SourceError};
use crate::util::Config;

use self::url::{default_conventions, expand_conventions, normalize_repository_url};

/// What the locator is asked to find.
#[derive(Debug, Clone, Copy)]
pub struct LocateRequest<'a> {
    pub resolved: &'a ResolvedDependency,
    /// Repository URL found in local metadata
    pub hint: Option<&'a str>,
    pub origin: RequestOrigin,
}

/// Why a candidate repository was rejected.
enum Rejection {
    Unreachable,
    NoTag,
    Transport(String),
}

/// Record of everything the locator tried for one dependency.
#[derive(Default)]
struct Attempts {
    tried: Vec<String>,
    transport_only: bool,
    any: bool,
    first_reachable: Option<Url>,
}

impl Attempts {
    fn record(&mut self, what: String, rejection: Rejection) {
        let reason = match &rejection {
            Rejection::Unreachable => "not reachable".to_string(),
            Rejection::NoTag => "no matching tag".to_string(),
            Rejection::Transport(e) => e.clone(),
        };
        let transport = matches!(rejection, Rejection::Transport(_));
        self.transport_only = if self.any {
            self.transport_only && transport
        } else {
            transport
        };
        self.any = true;
        self.tried.push(format!("{} ({})", what, reason));
    }
}

/// Finds the upstream source of resolved dependencies.
pub struct RepositoryLocator {
    registry: Arc<dyn PackageRegistry>,
    probe: Arc<dyn RepositoryProbe>,
    tags: TagPolicy,
    overrides: BTreeMap<String, BTreeMap<String, String>>,
    conventions: BTreeMap<String, Vec<String>>,
    allow_default_branch: bool,
}

impl RepositoryLocator {
    /// A locator with default tag patterns and conventions.
    pub fn new(registry: Arc<dyn PackageRegistry>, probe: Arc<dyn RepositoryProbe>) -> Self {
        RepositoryLocator {
            registry,
            probe,
            tags: TagPolicy::default(),
            overrides: BTreeMap::new(),
            conventions: BTreeMap::new(),
            allow_default_branch: false,
        }
    }

    /// A locator configured from the `[locator]` and `[overrides]` sections.
    pub fn from_config(
        registry: Arc<dyn PackageRegistry>,
        probe: Arc<dyn RepositoryProbe>,
        config: &Config,
    ) -> Self {
        RepositoryLocator {
            registry,
            probe,
            tags: TagPolicy::new(config.locator.tag_patterns.clone()),
            overrides: config.overrides.clone(),
            conventions: config.locator.conventions.clone(),
            allow_default_branch: config.locator.allow_default_branch,
        }
    }

    /// Locate the source of one resolved dependency.
    pub fn locate(&self, request: &LocateRequest<'_>) -> Result<SourceLocation, FetchError> {
        let resolved = request.resolved;
        let ecosystem = resolved.ecosystem();
        let name = resolved.name();
        let toolchain = request.origin == RequestOrigin::Toolchain;

        let mut attempts = Attempts::default();
        let mut seen = HashSet::new();
        let mut archive: Option<Url> = None;

        // Overrides and hints
        let mut early = Vec::new();
        if let Some(raw) = self.override_for(ecosystem, name) {
            early.push(("override", raw.to_string()));
        }
        if let Some(hint) = request.hint {
            early.push(("hint", hint.to_string()));
        }
        for (what, raw) in early {
            match normalize_repository_url(&raw) {
                Some(url) => {
                    if let Some(found) = self.try_repository(request, &url, &mut seen, &mut attempts) {
                        return Ok(found);
                    }
                }
                None => attempts.tried.push(format!("{} `{}` (not a repository URL)", what, raw)),
            }
        }

        if !toolchain {
            // Registry metadata
            if let PinnedVersion::Release { raw, .. } = resolved.version() {
                let query = PackageQuery {
                    ecosystem,
                    name,
                    repository: request.hint,
                };
                match self.registry.repository_metadata(&query, raw) {
                    Ok(meta) => {
                        archive = meta.archive_url;
                        for url in meta.repositories.iter().filter_map(|r| normalize_repository_url(r)) {
                            if let Some(found) = self.try_repository(request, &url, &mut seen, &mut attempts) {
                                return Ok(found.with_archive(archive));
                            }
                        }
                    }
                    Err(SourceError::NotFound(_)) => {
                        tracing::debug!("registry has no metadata for {} {}", name, raw);
                    }
                    Err(e) => attempts.record("registry metadata".into(), Rejection::Transport(e.to_string())),
                }
            }

            // Conventions
            for url in self.convention_urls(ecosystem, name) {
                if let Some(found) = self.try_repository(request, &url, &mut seen, &mut attempts) {
                    return Ok(found.with_archive(archive));
                }
            }
        }

        if let Some(archive) = archive {
            tracing::debug!("{} {}: using source archive {}", name, resolved.version(), archive);
            return Ok(SourceLocation::archive(archive));
        }

        if self.allow_default_branch {
            if let Some(url) = attempts.first_reachable.clone() {
                tracing::warn!(
                    "no tag for {} {} in {}, using the default branch",
                    name,
                    resolved.version(),
                    url
                );
                return Ok(SourceLocation::git(url, GitReference::DefaultBranch));
            }
        }

        if attempts.any && attempts.transport_only {
            return Err(FetchError::RegistryUnavailable {
                package: name.to_string(),
                message: attempts.tried.join("; "),
                stage: Stage::Locate,
            });
        }

        Err(FetchError::LocationNotFound {
            package: name.to_string(),
            version: resolved.version().to_string(),
            tried: attempts.tried,
        })
    }

    /// Probe one candidate repository for the dependency's reference.
    fn try_repository(
        &self,
        request: &LocateRequest<'_>,
        url: &Url,
        seen: &mut HashSet<Url>,
        attempts: &mut Attempts,
    ) -> Option<SourceLocation> {
        if !seen.insert(url.clone()) {
            return None;
        }

        let resolved = request.resolved;
        tracing::debug!("probing {} for {} {}", url, resolved.name(), resolved.version());

        let tags = match self.probe.list_tags(url) {
            Ok(Some(tags)) => tags,
            Ok(None) | Err(SourceError::NotFound(_)) => {
                attempts.record(url.to_string(), Rejection::Unreachable);
                return None;
            }
            Err(e) => {
                attempts.record(url.to_string(), Rejection::Transport(e.to_string()));
                return None;
            }
        };
        if attempts.first_reachable.is_none() {
            attempts.first_reachable = Some(url.clone());
        }

        let reference = match resolved.version() {
            PinnedVersion::Revision { rev } => Some(GitReference::Rev(rev.clone())),
            PinnedVersion::Release { version, raw } => {
                let scheme = VersionScheme::for_ecosystem(resolved.ecosystem());
                let policy = if request.origin == RequestOrigin::Toolchain {
                    let toolchain = Toolchain::for_ecosystem(resolved.ecosystem());
                    TagPolicy::new(toolchain.tag_patterns.iter().map(|p| p.to_string()).collect())
                } else {
                    self.tags.clone()
                };
                policy
                    .find_tag(resolved.name(), raw, Some(version), scheme, &tags)
                    .map(GitReference::Tag)
            }
        };

        match reference {
            Some(reference) => {
                tracing::debug!("{} {} -> {} ({})", resolved.name(), resolved.version(), url, reference);
                Some(SourceLocation::git(url.clone(), reference))
            }
            None => {
                attempts.record(url.to_string(), Rejection::NoTag);
                None
            }
        }
    }

    fn override_for(&self, ecosystem: Ecosystem, name: &str) -> Option<&str> {
        let packages = self.overrides.get(ecosystem.as_str())?;
        packages
            .get(name)
            .or_else(|| {
                let normalized = ecosystem.normalize_name(name);
                packages
                    .iter()
                    .find(|(key, _)| ecosystem.normalize_name(key) == normalized)
                    .map(|(_, url)| url)
            })
            .map(String::as_str)
    }

    fn convention_urls(&self, ecosystem: Ecosystem, name: &str) -> Vec<Url> {
        match self.conventions.get(ecosystem.as_str()) {
            Some(templates) => expand_conventions(templates, name),
            None => expand_conventions(&default_conventions(ecosystem), name),
        }
    }
}
