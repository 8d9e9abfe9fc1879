//! Dependency requests and resolved dependencies.
//!
//! A `DependencyRequest` is what an ecosystem adapter found in a project: a
//! name and the constraint text as written. A `ResolvedDependency` is the
//! concrete version chosen for it.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::ecosystem::Ecosystem;

/// Where a dependency request was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOrigin {
    /// A hand-written manifest (requirements.txt, package.json, ...)
    Manifest,
    /// A lockfile with exact versions
    Lockfile,
    /// An installed package tree (virtualenv, node_modules)
    Installed,
    /// The project's language toolchain
    Toolchain,
}

/// A dependency as declared by a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRequest {
    name: String,
    constraint: String,
    repository: Option<String>,
    origin: RequestOrigin,
}

impl DependencyRequest {
    /// Create a request with an ecosystem-native constraint string.
    pub fn new(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        DependencyRequest {
            name: name.into(),
            constraint: constraint.into().trim().to_string(),
            repository: None,
            origin: RequestOrigin::Manifest,
        }
    }

    /// Attach a repository URL found in local metadata.
    pub fn with_repository(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.trim().is_empty() {
            self.repository = Some(url.trim().to_string());
        }
        self
    }

    /// Set where the request came from.
    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraint(&self) -> &str {
        &self.constraint
    }

    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    pub fn origin(&self) -> RequestOrigin {
        self.origin
    }
}

impl fmt::Display for DependencyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraint.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.constraint)
        }
    }
}

/// A concrete version chosen for a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PinnedVersion {
    /// A published release. `raw` is the ecosystem's own spelling.
    Release { version: Version, raw: String },
    /// A source revision (commit hash) with no release number.
    Revision { rev: String },
}

impl PinnedVersion {
    /// Create a release pin.
    pub fn release(version: Version, raw: impl Into<String>) -> Self {
        PinnedVersion::Release {
            version,
            raw: raw.into(),
        }
    }

    /// The ecosystem-native spelling, used for cache keys and tags.
    pub fn as_str(&self) -> &str {
        match self {
            PinnedVersion::Release { raw, .. } => raw,
            PinnedVersion::Revision { rev } => rev,
        }
    }

    /// The parsed version of a release pin.
    pub fn semver(&self) -> Option<&Version> {
        match self {
            PinnedVersion::Release { version, .. } => Some(version),
            PinnedVersion::Revision { .. } => None,
        }
    }
}

impl fmt::Display for PinnedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency pinned to exactly one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedDependency {
    name: String,
    version: PinnedVersion,
    ecosystem: Ecosystem,
}

impl ResolvedDependency {
    pub(crate) fn new(ecosystem: Ecosystem, name: impl Into<String>, version: PinnedVersion) -> Self {
        ResolvedDependency {
            name: name.into(),
            version,
            ecosystem,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &PinnedVersion {
        &self.version
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }
}

impl fmt::Display for ResolvedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
