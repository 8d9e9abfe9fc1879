//! Source archives (PyPI sdists, npm tarballs).

use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;

use crate::core::SourceLocation;
use crate::sources::{ContentFetcher, HttpClient, SourceError};

/// Downloads and unpacks gzip-compressed tarballs.
pub struct ArchiveFetcher {
    client: Arc<dyn HttpClient>,
}

impl ArchiveFetcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        ArchiveFetcher { client }
    }
}

impl ContentFetcher for ArchiveFetcher {
    fn fetch(&self, location: &SourceLocation, dest: &Path) -> Result<(), SourceError> {
        let url = location
            .archive_url()
            .ok_or_else(|| SourceError::Invalid(format!("{} has no archive", location)))?;

        let path = url.path();
        if !(path.ends_with(".tar.gz") || path.ends_with(".tgz")) {
            return Err(SourceError::Invalid(format!("unsupported archive format: {}", url)));
        }

        tracing::info!("Downloading {}", url);
        let response = self.client.get(url.as_str())?.error_for_status(url.as_str())?;

        extract_tarball(&response.body, dest)
            .map_err(|e| SourceError::Invalid(format!("failed to unpack {}: {:#}", url, e)))
    }
}

/// Extract a gzip-compressed tarball into `dest`.
///
/// When every entry sits below one top-level directory (`requests-2.31.0/`,
/// npm's `package/`), that directory is stripped. Entries with absolute
/// paths or `..` components are rejected, as are links pointing outside
/// `dest` and entries that would be written through an earlier symlink.
pub fn extract_tarball(data: &[u8], dest: &Path) -> Result<()> {
    let strip_prefix = common_prefix(data)?;

    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create destination directory: {}", dest.display()))?;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();

        let relative = strip(&strip_prefix, &entry_path);
        // The stripped directory itself
        if relative.as_os_str().is_empty() {
            continue;
        }
        if !is_safe(&relative) {
            bail!("tarball entry escapes destination directory: {}", entry_path.display());
        }
        refuse_symlinked_path(dest, &relative)?;

        let output_path = dest.join(&relative);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&output_path).with_context(|| {
                    format!("failed to create directory: {}", output_path.display())
                })?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            tar::EntryType::Link => {
                let target = entry
                    .link_name()
                    .context("invalid hard link target")?
                    .map(|target| strip(&strip_prefix, &target))
                    .unwrap_or_default();
                if target.as_os_str().is_empty() || !is_safe(&target) {
                    bail!(
                        "hard link {} points outside the destination directory",
                        entry_path.display()
                    );
                }
                refuse_symlinked_path(dest, &target)?;
                std::fs::hard_link(dest.join(&target), &output_path).with_context(|| {
                    format!("failed to create hard link: {}", output_path.display())
                })?;
            }
            tar::EntryType::Symlink => {
                #[cfg(unix)]
                {
                    if let Some(target) = entry.link_name().context("invalid symlink target")? {
                        if !link_stays_inside(&relative, &target) {
                            bail!(
                                "symlink {} -> {} points outside the destination directory",
                                entry_path.display(),
                                target.display()
                            );
                        }
                        std::os::unix::fs::symlink(target.as_ref(), &output_path).with_context(
                            || format!("failed to create symlink: {}", output_path.display()),
                        )?;
                    }
                }
                #[cfg(windows)]
                {
                    tracing::debug!("Skipping symlink on Windows: {}", entry_path.display());
                }
            }
            // pax headers, fifos, devices
            _ => {
                tracing::debug!(
                    "Skipping unsupported entry type {:?}: {}",
                    entry_type,
                    entry_path.display()
                );
            }
        }
    }

    Ok(())
}

fn strip(prefix: &Option<PathBuf>, path: &Path) -> PathBuf {
    match prefix {
        Some(prefix) => path.strip_prefix(prefix).unwrap_or(path).to_path_buf(),
        None => path.to_path_buf(),
    }
}

/// Fail when any existing component of `dest/relative` is a symlink.
///
/// Writing through one would land outside `dest`.
fn refuse_symlinked_path(dest: &Path, relative: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        if std::fs::symlink_metadata(&current)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
        {
            bail!(
                "tarball entry {} goes through a symlink",
                relative.display()
            );
        }
    }
    Ok(())
}

/// Whether a symlink at `link` (relative to the destination) with `target`
/// resolves inside the destination.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    let mut depth = link.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            _ => return false,
        }
    }
    true
}

/// The single top-level directory shared by every entry, if there is one.
fn common_prefix(data: &[u8]) -> Result<Option<PathBuf>> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    let mut roots = BTreeSet::new();
    let mut has_nested = false;

    for entry in archive.entries().context("failed to read tarball entries")? {
        let entry = entry.context("failed to read tarball entry")?;
        let entry_type = entry.header().entry_type();
        if matches!(entry_type, tar::EntryType::XGlobalHeader | tar::EntryType::XHeader) {
            continue;
        }
        let path = entry.path().context("failed to get entry path")?;
        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        let Some(first) = components.next() else {
            continue;
        };
        let nested = components.next().is_some();
        // A top-level file means there is nothing to strip
        if !nested && !entry_type.is_dir() {
            return Ok(None);
        }
        has_nested |= nested;
        roots.insert(first.as_os_str().to_os_string());
    }

    if roots.len() == 1 && has_nested {
        Ok(roots.into_iter().next().map(PathBuf::from))
    } else {
        Ok(None)
    }
}

fn is_safe(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
