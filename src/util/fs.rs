//! Filesystem helpers with path-carrying errors.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Copy the tree under `src` into `dst`, creating `dst`.
///
/// Symlinks are recreated with their original target, never followed.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} escaped {}", entry.path().display(), src.display()))?;
        let target = dst.join(rel);
        let kind = entry.file_type();

        if kind.is_dir() {
            ensure_dir(&target)?;
        } else if kind.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("failed to read link {}", entry.path().display()))?;
            symlink(&link, &target)
                .with_context(|| format!("failed to create symlink {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Replace `path` with `contents` in one rename, creating parent directories.
///
/// Readers see either the old file or the complete new one.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create a temporary file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// A missing directory counts as empty.
pub fn is_dir_empty(path: &Path) -> Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Immediate subdirectories of `path`, sorted; empty when `path` is missing.
pub fn list_subdirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
            Ok(_) => {}
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {}
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }
    Ok(dirs)
}

/// Canonical form of `path`, or `path` itself when it does not exist yet.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("pkg");
        let dst = tmp.path().join("out/pkg");

        fs::create_dir_all(src.join("lib/empty")).unwrap();
        fs::write(src.join("setup.py"), "setup()").unwrap();
        fs::write(src.join("lib/core.py"), "x = 1").unwrap();

        copy_dir_all(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("setup.py")).unwrap(), "setup()");
        assert_eq!(fs::read_to_string(dst.join("lib/core.py")).unwrap(), "x = 1");
        assert!(dst.join("lib/empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_recreates_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("pkg");
        let dst = tmp.path().join("copy");

        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("LICENSE"), "MIT").unwrap();
        symlink(Path::new("LICENSE"), &src.join("COPYING")).unwrap();

        copy_dir_all(&src, &dst).unwrap();

        let link = dst.join("COPYING");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("LICENSE"));
    }

    #[test]
    fn test_write_string_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/manifest.json");

        write_string(&path, "{}").unwrap();
        write_string(&path, "{\"entries\": []}").unwrap();

        assert_eq!(read_to_string(&path).unwrap(), "{\"entries\": []}");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let tmp = TempDir::new().unwrap();
        remove_dir_all_if_exists(&tmp.path().join("gone")).unwrap();
    }

    #[test]
    fn test_is_dir_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(is_dir_empty(tmp.path()).unwrap());
        assert!(is_dir_empty(&tmp.path().join("missing")).unwrap());

        fs::write(tmp.path().join("a"), "a").unwrap();
        assert!(!is_dir_empty(tmp.path()).unwrap());
    }

    #[test]
    fn test_list_subdirs_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("b")).unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        fs::write(tmp.path().join("file"), "").unwrap();

        let names: Vec<_> = list_subdirs(tmp.path())
            .unwrap()
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(list_subdirs(&tmp.path().join("missing")).unwrap().is_empty());
    }
}
