//! Version resolution.
//!
//! Requests for the same package are merged into a single `Requirement`
//! whose constraint is the intersection of every request's constraint. Each
//! requirement then resolves to the highest matching version published by
//! the registry.

pub mod constraint;
pub mod version;

pub use constraint::Constraint;
pub use version::VersionScheme;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use semver::Version;

use crate::core::{
    DependencyRequest, Ecosystem, FetchError, PinnedVersion, RequestOrigin, ResolvedDependency,
    Stage,
};
use crate::resolver::constraint::is_prerelease;
use crate::sources::{PackageQuery, PackageRegistry, SourceError};

/// How many versions to list in a `NoMatchingVersion` error.
const MAX_LISTED_VERSIONS: usize = 10;

/// All requests for one package, merged.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub ecosystem: Ecosystem,
    /// Name as first requested
    pub name: String,
    pub constraint: Constraint,
    /// Constraint text as written, joined across merged requests
    pub constraint_text: String,
    pub repository: Option<String>,
    pub origin: RequestOrigin,
    parse_error: Option<String>,
}

impl Requirement {
    fn from_request(ecosystem: Ecosystem, request: &DependencyRequest) -> Self {
        let (constraint, parse_error) = match Constraint::parse(ecosystem, request.constraint()) {
            Ok(c) => (c, None),
            Err(e) => (Constraint::any(), Some(e)),
        };
        Requirement {
            ecosystem,
            name: request.name().to_string(),
            constraint,
            constraint_text: request.constraint().to_string(),
            repository: request.repository().map(str::to_string),
            origin: request.origin(),
            parse_error,
        }
    }

    fn merge(&mut self, request: &DependencyRequest) {
        let other = Requirement::from_request(self.ecosystem, request);

        self.constraint = self.constraint.intersect(&other.constraint);
        if !other.constraint_text.is_empty()
            && !self
                .constraint_text
                .split(" & ")
                .any(|t| t == other.constraint_text)
        {
            if self.constraint_text.is_empty() {
                self.constraint_text = other.constraint_text;
            } else {
                self.constraint_text = format!("{} & {}", self.constraint_text, other.constraint_text);
            }
        }
        if self.repository.is_none() {
            self.repository = other.repository;
        }
        if self.parse_error.is_none() {
            self.parse_error = other.parse_error;
        }
    }

    /// Registry query for this requirement.
    pub fn query(&self) -> PackageQuery<'_> {
        PackageQuery {
            ecosystem: self.ecosystem,
            name: &self.name,
            repository: self.repository.as_deref(),
        }
    }
}

/// Merge requests that name the same package, keeping first-seen order.
pub fn merge_requests(ecosystem: Ecosystem, requests: &[DependencyRequest]) -> Vec<Requirement> {
    let mut merged: Vec<Requirement> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for request in requests {
        let key = ecosystem.normalize_name(request.name());
        match index.get(&key) {
            Some(&i) => merged[i].merge(request),
            None => {
                index.insert(key, merged.len());
                merged.push(Requirement::from_request(ecosystem, request));
            }
        }
    }

    merged
}

/// Picks a concrete version for each requirement.
pub struct VersionResolver {
    registry: Arc<dyn PackageRegistry>,
}

impl VersionResolver {
    pub fn new(registry: Arc<dyn PackageRegistry>) -> Self {
        VersionResolver { registry }
    }

    /// Resolve a requirement to a single version.
    pub fn resolve(&self, req: &Requirement) -> Result<ResolvedDependency, FetchError> {
        if let Some(message) = &req.parse_error {
            return Err(FetchError::InvalidConstraint {
                package: req.name.clone(),
                constraint: req.constraint_text.clone(),
                message: message.clone(),
            });
        }

        let scheme = VersionScheme::for_ecosystem(req.ecosystem);

        if let Constraint::Revision(rev) = &req.constraint {
            tracing::debug!("{} pinned to revision {}", req.name, rev);
            return Ok(ResolvedDependency::new(
                req.ecosystem,
                &req.name,
                PinnedVersion::Revision { rev: rev.clone() },
            ));
        }

        // Toolchain versions come straight from the project's tool pins
        if req.origin == RequestOrigin::Toolchain {
            let raw = req.constraint_text.trim_start_matches('=').trim();
            let version = scheme.parse(raw).ok_or_else(|| FetchError::InvalidConstraint {
                package: req.name.clone(),
                constraint: req.constraint_text.clone(),
                message: "toolchain version is not a full version".into(),
            })?;
            return Ok(ResolvedDependency::new(
                req.ecosystem,
                &req.name,
                PinnedVersion::release(version, raw),
            ));
        }

        if req.constraint.is_empty() {
            return Err(FetchError::NoMatchingVersion {
                package: req.name.clone(),
                constraint: req.constraint_text.clone(),
                available: Vec::new(),
            });
        }

        let available = match self.registry.available_versions(&req.query()) {
            Ok(versions) => versions,
            Err(SourceError::NotFound(_)) => Vec::new(),
            Err(e) => {
                return Err(FetchError::RegistryUnavailable {
                    package: req.name.clone(),
                    message: e.to_string(),
                    stage: Stage::Resolve,
                })
            }
        };

        let parsed: Vec<(Version, &str)> = available
            .iter()
            .filter_map(|raw| scheme.parse(raw).map(|v| (v, raw.as_str())))
            .collect();

        match select_version(&req.constraint, &parsed) {
            Some((version, raw)) => {
                tracing::debug!("resolved {} {} -> {}", req.name, req.constraint_text, raw);
                Ok(ResolvedDependency::new(
                    req.ecosystem,
                    &req.name,
                    PinnedVersion::release(version.clone(), raw),
                ))
            }
            None => Err(FetchError::NoMatchingVersion {
                package: req.name.clone(),
                constraint: req.constraint_text.clone(),
                available: newest(parsed),
            }),
        }
    }
}

/// Highest matching version, preferring stable releases.
///
/// When several spellings parse to the same version, the lexicographically
/// smallest one is returned.
fn select_version<'a>(
    constraint: &Constraint,
    candidates: &'a [(Version, &'a str)],
) -> Option<(&'a Version, &'a str)> {
    let best = |stable: bool| {
        candidates
            .iter()
            .filter(|(v, _)| constraint.matches(v))
            .filter(|(v, _)| is_prerelease(v) != stable)
            .max_by(|a, b| by_version_then_spelling(a, b))
            .map(|(v, raw)| (v, *raw))
    };
    best(true).or_else(|| best(false))
}

fn by_version_then_spelling(a: &(Version, &str), b: &(Version, &str)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1))
}

/// The newest available versions, oldest first.
fn newest(mut parsed: Vec<(Version, &str)>) -> Vec<String> {
    parsed.sort_by(by_version_then_spelling);
    parsed.dedup_by(|a, b| a.0 == b.0);
    let skip = parsed.len().saturating_sub(MAX_LISTED_VERSIONS);
    parsed
        .into_iter()
        .skip(skip)
        .map(|(_, raw)| raw.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRegistry;

    fn resolver(registry: FakeRegistry) -> VersionResolver {
        VersionResolver::new(Arc::new(registry))
    }

    fn requirement(eco: Ecosystem, name: &str, constraint: &str) -> Requirement {
        merge_requests(eco, &[DependencyRequest::new(name, constraint)]).remove(0)
    }

    #[test]
    fn test_selects_highest_matching() {
        let registry = FakeRegistry::new().with_versions(
            Ecosystem::Npm,
            "left-pad",
            &["1.0.0", "1.2.0", "2.0.0"],
        );
        let resolved = resolver(registry)
            .resolve(&requirement(Ecosystem::Npm, "left-pad", "^1.0.0"))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "1.2.0");
    }

    #[test]
    fn test_pip_end_to_end_selection() {
        let registry = FakeRegistry::new().with_versions(
            Ecosystem::Pip,
            "requests",
            &["2.28.0", "2.31.0", "3.0.0"],
        );
        let resolved = resolver(registry)
            .resolve(&requirement(Ecosystem::Pip, "requests", ">=2.0,<3.0"))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "2.31.0");
        assert_eq!(resolved.ecosystem(), Ecosystem::Pip);
    }

    #[test]
    fn test_prefers_stable_releases() {
        let registry = FakeRegistry::new().with_versions(
            Ecosystem::Pip,
            "numpy",
            &["1.26.0", "2.0.0rc1"],
        );
        let r = resolver(registry);
        let resolved = r.resolve(&requirement(Ecosystem::Pip, "numpy", "")).unwrap();
        assert_eq!(resolved.version().as_str(), "1.26.0");

        let resolved = r
            .resolve(&requirement(Ecosystem::Pip, "numpy", ">=2.0.0rc1"))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "2.0.0rc1");
    }

    #[test]
    fn test_pip_prerelease_phases_order_like_pip() {
        let registry = FakeRegistry::new().with_versions(
            Ecosystem::Pip,
            "pkg",
            &["2.0.dev1", "2.0b1", "2.0a3"],
        );
        let resolved = resolver(registry)
            .resolve(&requirement(Ecosystem::Pip, "pkg", ">=2.0.dev0"))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "2.0b1");
    }

    #[test]
    fn test_equal_versions_pick_smallest_spelling() {
        let registry =
            FakeRegistry::new().with_versions(Ecosystem::Pip, "six", &["1.16.0", "1.16"]);
        let resolved = resolver(registry)
            .resolve(&requirement(Ecosystem::Pip, "six", ""))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "1.16");
    }

    #[test]
    fn test_unparseable_versions_are_ignored() {
        let registry = FakeRegistry::new().with_versions(
            Ecosystem::Npm,
            "chalk",
            &["nightly", "4.1.2"],
        );
        let resolved = resolver(registry)
            .resolve(&requirement(Ecosystem::Npm, "chalk", ""))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "4.1.2");
    }

    #[test]
    fn test_no_matching_version() {
        let registry = FakeRegistry::new().with_versions(Ecosystem::Npm, "chalk", &["4.1.2"]);
        let err = resolver(registry)
            .resolve(&requirement(Ecosystem::Npm, "chalk", "^5.0.0"))
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::NoMatchingVersion { ref available, .. } if available == &["4.1.2"]
        ));
    }

    #[test]
    fn test_unknown_package_is_no_matching_version() {
        let err = resolver(FakeRegistry::new())
            .resolve(&requirement(Ecosystem::Pip, "does-not-exist", ""))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_transport_failure_is_registry_unavailable() {
        let registry = FakeRegistry::new().failing("flaky");
        let err = resolver(registry)
            .resolve(&requirement(Ecosystem::Pip, "flaky", ""))
            .unwrap_err();
        assert!(matches!(err, FetchError::RegistryUnavailable { stage: Stage::Resolve, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_constraint() {
        let err = resolver(FakeRegistry::new())
            .resolve(&requirement(Ecosystem::Pip, "requests", ">=banana"))
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidConstraint { .. }));
    }

    #[test]
    fn test_revision_skips_registry() {
        let registry = FakeRegistry::new();
        let calls = registry.calls();
        let resolved = resolver(registry)
            .resolve(&requirement(Ecosystem::Swift, "swift-nio", "revision:abc123"))
            .unwrap();
        assert_eq!(resolved.version().as_str(), "abc123");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_toolchain_version_is_verbatim() {
        let request = DependencyRequest::new("cpython", "3.12.1").with_origin(RequestOrigin::Toolchain);
        let req = merge_requests(Ecosystem::Pip, &[request]).remove(0);
        let resolved = resolver(FakeRegistry::new()).resolve(&req).unwrap();
        assert_eq!(resolved.version().as_str(), "3.12.1");
    }

    #[test]
    fn test_merge_requests_intersects_and_keeps_order() {
        let requests = vec![
            DependencyRequest::new("Requests", ">=2.0"),
            DependencyRequest::new("numpy", ""),
            DependencyRequest::new("requests", "<2.30")
                .with_repository("https://github.com/psf/requests"),
        ];
        let merged = merge_requests(Ecosystem::Pip, &requests);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Requests");
        assert_eq!(merged[1].name, "numpy");
        assert_eq!(merged[0].constraint_text, ">=2.0 & <2.30");
        assert_eq!(
            merged[0].repository.as_deref(),
            Some("https://github.com/psf/requests")
        );
        assert!(merged[0].constraint.matches(&Version::new(2, 29, 0)));
        assert!(!merged[0].constraint.matches(&Version::new(2, 31, 0)));
    }

    #[test]
    fn test_disjoint_merge_is_no_matching_version() {
        let requests = vec![
            DependencyRequest::new("chalk", "^4.0.0"),
            DependencyRequest::new("chalk", "^5.0.0"),
        ];
        let merged = merge_requests(Ecosystem::Npm, &requests);
        let registry =
            FakeRegistry::new().with_versions(Ecosystem::Npm, "chalk", &["4.1.2", "5.3.0"]);
        let err = resolver(registry).resolve(&merged[0]).unwrap_err();
        assert!(matches!(err, FetchError::NoMatchingVersion { .. }));
    }
}
