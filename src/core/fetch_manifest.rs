//! The report produced by a fetch run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::ecosystem::Ecosystem;
use crate::core::errors::{FetchError, Stage};
use crate::core::source_location::SourceLocation;

/// Final state of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchOutcome {
    Fetched,
    AlreadyCached,
    NotFound,
    Failed,
}

impl FetchOutcome {
    /// Map a per-dependency error to an outcome.
    pub fn from_error(err: &FetchError) -> Self {
        if err.is_not_found() {
            FetchOutcome::NotFound
        } else {
            FetchOutcome::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Fetched => "fetched",
            FetchOutcome::AlreadyCached => "already-cached",
            FetchOutcome::NotFound => "not-found",
            FetchOutcome::Failed => "failed",
        }
    }

    /// Whether the dependency's content is available in the cache.
    pub fn is_available(&self) -> bool {
        matches!(self, FetchOutcome::Fetched | FetchOutcome::AlreadyCached)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dependency's line in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub dependency: String,
    pub constraint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub outcome: FetchOutcome,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_to: Option<PathBuf>,
}

impl ManifestEntry {
    /// An entry whose content is in the cache.
    pub(crate) fn available(
        dependency: impl Into<String>,
        constraint: impl Into<String>,
        version: impl Into<String>,
        outcome: FetchOutcome,
        path: PathBuf,
        source: SourceLocation,
        content_hash: impl Into<String>,
    ) -> Self {
        let detail = match outcome {
            FetchOutcome::AlreadyCached => String::from("served from cache"),
            _ => format!("fetched from {}", source.describe()),
        };
        ManifestEntry {
            dependency: dependency.into(),
            constraint: constraint.into(),
            version: Some(version.into()),
            outcome,
            detail,
            stage: None,
            retryable: false,
            path: Some(path),
            source: Some(source),
            content_hash: Some(content_hash.into()),
            exported_to: None,
        }
    }

    /// An entry for a dependency that could not be fetched.
    pub(crate) fn from_error(
        dependency: impl Into<String>,
        constraint: impl Into<String>,
        version: Option<String>,
        err: &FetchError,
    ) -> Self {
        ManifestEntry {
            dependency: dependency.into(),
            constraint: constraint.into(),
            version,
            outcome: FetchOutcome::from_error(err),
            detail: err.to_string(),
            stage: Some(err.stage()),
            retryable: err.is_transient(),
            path: None,
            source: None,
            content_hash: None,
            exported_to: None,
        }
    }

    pub(crate) fn set_exported(&mut self, dest: PathBuf) {
        self.exported_to = Some(dest);
    }

    pub(crate) fn note(&mut self, note: impl AsRef<str>) {
        self.detail.push_str("; ");
        self.detail.push_str(note.as_ref());
    }
}

/// The ordered report of one fetch run.
///
/// Entries appear in the order their dependencies were first requested. The
/// manifest carries no timestamps, so identical inputs give identical output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchManifest {
    ecosystem: Ecosystem,
    project_root: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl FetchManifest {
    pub(crate) fn new(ecosystem: Ecosystem, project_root: &Path, entries: Vec<ManifestEntry>) -> Self {
        FetchManifest {
            ecosystem,
            project_root: project_root.to_path_buf(),
            entries,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Look up an entry by dependency name.
    pub fn entry(&self, dependency: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.dependency == dependency)
    }

    /// Number of entries with the given outcome.
    pub fn count(&self, outcome: FetchOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(FetchOutcome::Failed) > 0
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            2
        } else {
            0
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// One-line summary, e.g. `3 fetched, 1 already cached, 1 failed`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            (FetchOutcome::Fetched, "fetched"),
            (FetchOutcome::AlreadyCached, "already cached"),
            (FetchOutcome::NotFound, "not found"),
            (FetchOutcome::Failed, "failed"),
        ]
        .iter()
        .filter_map(|(outcome, label)| {
            let n = self.count(*outcome);
            (n > 0).then(|| format!("{} {}", n, label))
        })
        .collect();

        if parts.is_empty() {
            String::from("no dependencies")
        } else {
            parts.join(", ")
        }
    }
}
