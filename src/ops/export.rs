//! Copying cached sources into the project.
//!
//! Exported entries live at `<project>/<export dir>/<ecosystem>/<name>/<version>`.
//! An existing export is never overwritten, so local edits survive re-runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cache::CacheKey;
use crate::core::{Ecosystem, ManifestEntry};
use crate::util::fs::{copy_dir_all, ensure_dir};

/// Export every available entry into `export_root`.
///
/// Failures are logged and noted on the entry; they never change its
/// outcome.
pub fn export_entries(ecosystem: Ecosystem, export_root: &Path, entries: &mut [ManifestEntry]) {
    for entry in entries.iter_mut().filter(|e| e.outcome.is_available()) {
        let (Some(version), Some(content)) = (entry.version.clone(), entry.path.clone()) else {
            continue;
        };

        let dest = export_root.join(CacheKey::new(ecosystem, &entry.dependency, &version).relative_path());
        match export_one(&content, &dest) {
            Ok(copied) => {
                if copied {
                    tracing::info!("Exported {} {} to {}", entry.dependency, version, dest.display());
                } else {
                    tracing::debug!("{} already exported", dest.display());
                }
                entry.set_exported(dest);
            }
            Err(e) => {
                tracing::warn!("failed to export {} {}: {:#}", entry.dependency, version, e);
                entry.note(format!("export failed: {:#}", e));
            }
        }
    }
}

/// Copy `content` to `dest` through a sibling staging directory.
///
/// Returns false when `dest` already exists.
fn export_one(content: &Path, dest: &Path) -> Result<bool> {
    if dest.exists() {
        return Ok(false);
    }

    let parent = dest
        .parent()
        .with_context(|| format!("{} has no parent directory", dest.display()))?;
    ensure_dir(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".export-")
        .tempdir_in(parent)
        .with_context(|| format!("failed to create staging directory in {}", parent.display()))?;
    let staged: PathBuf = staging.path().join("content");
    copy_dir_all(content, &staged)?;

    match std::fs::rename(&staged, dest) {
        Ok(()) => Ok(true),
        // Another run exported it first
        Err(_) if dest.exists() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to move export into {}", dest.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FetchOutcome, GitReference, SourceLocation};
    use crate::test_support::assertions::assert_file_contains;
    use tempfile::TempDir;
    use url::Url;

    fn available(name: &str, version: &str, content: &Path) -> ManifestEntry {
        ManifestEntry::available(
            name,
            "",
            version,
            FetchOutcome::Fetched,
            content.to_path_buf(),
            SourceLocation::git(
                Url::parse("https://github.com/psf/requests").unwrap(),
                GitReference::Tag(format!("v{}", version)),
            ),
            "hash",
        )
    }

    #[test]
    fn test_export_copies_available_entries() {
        let cache = TempDir::new().unwrap();
        std::fs::create_dir_all(cache.path().join("src")).unwrap();
        std::fs::write(cache.path().join("src/api.py"), "def get(): ...").unwrap();
        let project = TempDir::new().unwrap();
        let refs = project.path().join("refs");

        let mut entries = vec![available("requests", "2.31.0", cache.path())];
        export_entries(Ecosystem::Pip, &refs, &mut entries);

        let dest = refs.join("pip/requests/2.31.0");
        assert_eq!(entries[0].exported_to.as_deref(), Some(dest.as_path()));
        assert_file_contains(dest.join("src/api.py"), "def get()");
        assert_eq!(std::fs::read_dir(refs.join("pip/requests")).unwrap().count(), 1);
    }

    #[test]
    fn test_existing_export_is_kept() {
        let cache = TempDir::new().unwrap();
        std::fs::write(cache.path().join("README.md"), "new").unwrap();
        let project = TempDir::new().unwrap();
        let dest = project.path().join("refs/pip/requests/2.31.0");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("README.md"), "edited").unwrap();

        let mut entries = vec![available("requests", "2.31.0", cache.path())];
        export_entries(Ecosystem::Pip, &project.path().join("refs"), &mut entries);

        assert_file_contains(dest.join("README.md"), "edited");
        assert!(entries[0].exported_to.is_some());
    }

    #[test]
    fn test_export_failure_is_noted() {
        let project = TempDir::new().unwrap();
        let missing = project.path().join("no-such-content");
        let mut entries = vec![available("requests", "2.31.0", &missing)];

        export_entries(Ecosystem::Pip, &project.path().join("refs"), &mut entries);

        assert_eq!(entries[0].outcome, FetchOutcome::Fetched);
        assert!(entries[0].exported_to.is_none());
        assert!(entries[0].detail.contains("export failed"));
    }
}
