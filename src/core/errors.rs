//! Fetch error taxonomy and diagnostics.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ecosystem::Ecosystem;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reading the project's dependency manifests
    Discover,
    /// Picking a concrete version
    Resolve,
    /// Finding the upstream repository and ref
    Locate,
    /// Downloading content
    Fetch,
    /// Reading or publishing cache entries
    Cache,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Discover => "discover",
            Stage::Resolve => "resolve",
            Stage::Locate => "locate",
            Stage::Fetch => "fetch",
            Stage::Cache => "cache",
        };
        f.write_str(s)
    }
}

/// Error raised while fetching a project's dependencies.
///
/// `UnsupportedEcosystem`, `ManifestNotFound` and `ManifestInvalid` abort a
/// run before any dependency is processed. Every other variant is scoped to
/// a single dependency and ends up in that dependency's manifest entry.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum FetchError {
    #[error("unsupported ecosystem `{0}`")]
    #[diagnostic(
        code(ref_fetch::discover::unsupported_ecosystem),
        help("supported ecosystems are: pip, npm, swift")
    )]
    UnsupportedEcosystem(String),

    #[error("no dependency manifest found for `{ecosystem}` in {}", .root.display())]
    #[diagnostic(code(ref_fetch::discover::manifest_not_found))]
    ManifestNotFound {
        ecosystem: Ecosystem,
        root: PathBuf,
        looked_for: Vec<&'static str>,
    },

    #[error("failed to read {}: {message}", .path.display())]
    #[diagnostic(code(ref_fetch::discover::manifest_invalid))]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("invalid version constraint `{constraint}` for `{package}`: {message}")]
    #[diagnostic(code(ref_fetch::resolve::invalid_constraint))]
    InvalidConstraint {
        package: String,
        constraint: String,
        message: String,
    },

    #[error("no version of `{package}` matches `{constraint}`")]
    #[diagnostic(code(ref_fetch::resolve::no_matching_version))]
    NoMatchingVersion {
        package: String,
        constraint: String,
        available: Vec<String>,
    },

    #[error("registry unavailable for `{package}`: {message}")]
    #[diagnostic(code(ref_fetch::net::registry_unavailable))]
    RegistryUnavailable {
        package: String,
        message: String,
        stage: Stage,
    },

    #[error("no source location found for `{package}` {version}")]
    #[diagnostic(code(ref_fetch::locate::not_found))]
    LocationNotFound {
        package: String,
        version: String,
        tried: Vec<String>,
    },

    #[error("failed to fetch `{package}` {version}: {message}")]
    #[diagnostic(code(ref_fetch::fetch::failed))]
    FetchFailed {
        package: String,
        version: String,
        message: String,
        retryable: bool,
    },

    #[error("cache entry `{key}` is corrupted (expected {expected}, found {actual})")]
    #[diagnostic(code(ref_fetch::cache::corruption))]
    CacheCorruption {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("cache error for `{key}`: {message}")]
    #[diagnostic(code(ref_fetch::cache::io))]
    Cache { key: String, message: String },

    #[error("cancelled before `{package}` completed")]
    #[diagnostic(code(ref_fetch::cancelled))]
    Cancelled { package: String },
}

impl FetchError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            FetchError::UnsupportedEcosystem(_)
            | FetchError::ManifestNotFound { .. }
            | FetchError::ManifestInvalid { .. } => Stage::Discover,
            FetchError::InvalidConstraint { .. } | FetchError::NoMatchingVersion { .. } => {
                Stage::Resolve
            }
            FetchError::RegistryUnavailable { stage, .. } => *stage,
            FetchError::LocationNotFound { .. } => Stage::Locate,
            FetchError::FetchFailed { .. } | FetchError::Cancelled { .. } => Stage::Fetch,
            FetchError::CacheCorruption { .. } | FetchError::Cache { .. } => Stage::Cache,
        }
    }

    /// Whether the error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::UnsupportedEcosystem(_)
                | FetchError::ManifestNotFound { .. }
                | FetchError::ManifestInvalid { .. }
        )
    }

    /// Whether re-running later can succeed without any change.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RegistryUnavailable { .. } | FetchError::Cancelled { .. } => true,
            FetchError::FetchFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether the error means the dependency does not exist upstream, as
    /// opposed to a failure while getting it.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FetchError::NoMatchingVersion { .. } | FetchError::LocationNotFound { .. }
        )
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = match self {
            FetchError::UnsupportedEcosystem(name) => {
                Diagnostic::error(format!("unsupported ecosystem `{}`", name))
                    .with_suggestion(suggestions::UNSUPPORTED_ECOSYSTEM)
            }

            FetchError::ManifestNotFound {
                ecosystem,
                root,
                looked_for,
            } => Diagnostic::error(format!(
                "no dependency manifest found for `{}`",
                ecosystem
            ))
            .with_location(root.clone())
            .with_context(format!("looked for: {}", looked_for.join(", ")))
            .with_suggestion(suggestions::NO_MANIFEST),

            FetchError::ManifestInvalid { path, message } => {
                Diagnostic::error(format!("failed to read dependency manifest: {}", message))
                    .with_location(path.clone())
            }

            FetchError::InvalidConstraint {
                package,
                constraint,
                message,
            } => Diagnostic::error(format!(
                "invalid version constraint `{}` for `{}`",
                constraint, package
            ))
            .with_context(message.clone()),

            FetchError::NoMatchingVersion {
                package,
                constraint,
                available,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no version of `{}` matches `{}`",
                    package, constraint
                ));

                if available.is_empty() {
                    diag = diag.with_context("the registry lists no versions for this package");
                } else {
                    diag = diag.with_context(format!(
                        "available versions: {}",
                        available.join(", ")
                    ));
                }

                diag
            }

            FetchError::RegistryUnavailable {
                package,
                message,
                stage,
            } => Diagnostic::error(format!("registry unavailable for `{}`", package))
                .with_context(format!("{} stage: {}", stage, message))
                .with_suggestion(suggestions::NETWORK),

            FetchError::LocationNotFound {
                package,
                version,
                tried,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no source location found for `{}` {}",
                    package, version
                ));
                for candidate in tried {
                    diag = diag.with_context(format!("tried {}", candidate));
                }
                diag.with_suggestion(suggestions::ADD_OVERRIDE)
                    .with_suggestion(suggestions::TAG_PATTERNS)
            }

            FetchError::FetchFailed {
                package,
                version,
                message,
                retryable,
            } => {
                let diag = Diagnostic::error(format!("failed to fetch `{}` {}", package, version))
                    .with_context(message.clone());
                if *retryable {
                    diag.with_suggestion(suggestions::NETWORK)
                } else {
                    diag
                }
            }

            FetchError::CacheCorruption {
                key,
                expected,
                actual,
            } => Diagnostic::error(format!("cache entry `{}` is corrupted", key))
                .with_context(format!("expected content hash {}", expected))
                .with_context(format!("found content hash {}", actual))
                .with_suggestion(suggestions::CACHE_CLEAN),

            FetchError::Cache { key, message } => {
                Diagnostic::error(format!("cache error for `{}`", key)).with_context(message.clone())
            }

            FetchError::Cancelled { package } => {
                Diagnostic::error(format!("cancelled before `{}` completed", package))
            }
        };
        diag.with_code(MietteDiagnostic::code(self).map(|code| code.to_string()))
    }
}
