//! Hashing utilities for content addressing and cache verification.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Compute the content hash of a directory tree.
///
/// Entries are visited in sorted relative-path order. Each entry contributes
/// its kind, its `/`-separated relative path, and its bytes (or link target),
/// so the hash only changes when the tree's content or shape changes.
pub fn sha256_dir(root: &Path) -> Result<String> {
    let mut fp = Fingerprint::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("failed to walk directory: {}", root.display()))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("entry outside of {}", root.display()))?
            .to_string_lossy()
            .replace('\\', "/");

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fp.update_str("dir").update_str(&rel);
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .with_context(|| format!("failed to read link: {}", entry.path().display()))?;
            fp.update_str("link")
                .update_str(&rel)
                .update_str(&target.to_string_lossy());
        } else {
            fp.update_str("file").update_str(&rel);
            fp.update_file(entry.path())?;
        }
    }

    Ok(fp.finish())
}

/// Accumulates tree components into one digest.
struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0"); // Separator
        self
    }

    /// Stream a file's bytes into the fingerprint, prefixed by its length.
    fn update_file(&mut self, path: &Path) -> Result<&mut Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.update_str(&len.to_string());

        let mut reader = BufReader::new(file);
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .with_context(|| format!("failed to read file: {}", path.display()))?;
            if bytes_read == 0 {
                break;
            }
            self.hasher.update(&buffer[..bytes_read]);
        }

        Ok(self)
    }

    /// Finalize and return the fingerprint as a hex string.
    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
