//! The default content fetcher: git first, the source archive second.

use std::path::Path;
use std::sync::Arc;

use crate::core::SourceLocation;
use crate::sources::{ArchiveFetcher, ContentFetcher, GitFetcher, HttpClient, SourceError};

/// Fetches a location's git reference, falling back to its archive.
pub struct SourceFetcher {
    git: Arc<dyn ContentFetcher>,
    archive: Arc<dyn ContentFetcher>,
}

impl SourceFetcher {
    /// Git over libgit2 and archives over `client`.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        SourceFetcher::with_fetchers(Arc::new(GitFetcher::new()), Arc::new(ArchiveFetcher::new(client)))
    }

    pub fn with_fetchers(git: Arc<dyn ContentFetcher>, archive: Arc<dyn ContentFetcher>) -> Self {
        SourceFetcher { git, archive }
    }
}

impl ContentFetcher for SourceFetcher {
    fn fetch(&self, location: &SourceLocation, dest: &Path) -> Result<(), SourceError> {
        if location.reference().is_none() {
            return self.archive.fetch(location, dest);
        }

        let git_err = match self.git.fetch(location, dest) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let Some(archive) = location.archive_url() else {
            return Err(git_err);
        };

        tracing::warn!("git fetch failed ({}), trying {}", git_err, archive);
        clear_dir(dest)?;
        self.archive.fetch(location, dest)
    }
}

/// Remove everything inside `dir`, keeping the directory.
fn clear_dir(dir: &Path) -> Result<(), SourceError> {
    let io_err = |e: std::io::Error| SourceError::Invalid(format!("failed to clear {}: {}", dir.display(), e));
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() && !path.is_symlink() {
            std::fs::remove_dir_all(&path).map_err(io_err)?;
        } else {
            std::fs::remove_file(&path).map_err(io_err)?;
        }
    }
    Ok(())
}
