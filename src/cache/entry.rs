//! Cache entry records (`entry.json`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::key::CacheKey;
use crate::core::{Ecosystem, SourceLocation};
use crate::util::fs::{read_to_string, write_string};

/// File name of the record stored next to an entry's content.
pub const ENTRY_FILE: &str = "entry.json";

/// Directory holding an entry's fetched content.
pub const CONTENT_DIR: &str = "content";

/// A published cache entry.
///
/// Entries are written once, when their content is published, and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of the content tree
    pub content_hash: String,
    pub source: SourceLocation,
    /// Content directory, filled in when the record is read
    #[serde(skip)]
    pub local_path: PathBuf,
}

impl CacheEntry {
    pub(crate) fn new(key: &CacheKey, source: SourceLocation, content_hash: String) -> Self {
        CacheEntry {
            ecosystem: key.ecosystem(),
            name: key.name().to_string(),
            version: key.version().to_string(),
            fetched_at: Utc::now(),
            content_hash,
            source,
            local_path: PathBuf::new(),
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.ecosystem, &self.name, &self.version)
    }

    /// Read the record in `entry_dir`.
    pub(crate) fn read(entry_dir: &Path) -> Result<Self> {
        let path = entry_dir.join(ENTRY_FILE);
        let content = read_to_string(&path)?;
        let mut entry: CacheEntry = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        entry.local_path = entry_dir.join(CONTENT_DIR);
        Ok(entry)
    }

    /// Write the record into `entry_dir`.
    pub(crate) fn write(&self, entry_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize cache entry")?;
        write_string(&entry_dir.join(ENTRY_FILE), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GitReference;
    use tempfile::TempDir;
    use url::Url;

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let key = CacheKey::new(Ecosystem::Npm, "left-pad", "1.3.0");
        let source = SourceLocation::git(
            Url::parse("https://github.com/left-pad/left-pad").unwrap(),
            GitReference::Tag("v1.3.0".into()),
        );
        let entry = CacheEntry::new(&key, source, "deadbeef".into());
        entry.write(tmp.path()).unwrap();

        let read = CacheEntry::read(tmp.path()).unwrap();
        assert_eq!(read.name, "left-pad");
        assert_eq!(read.content_hash, "deadbeef");
        assert_eq!(read.local_path, tmp.path().join(CONTENT_DIR));
        assert_eq!(read.key(), key);
    }

    #[test]
    fn test_read_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(ENTRY_FILE), "not json").unwrap();
        assert!(CacheEntry::read(tmp.path()).is_err());
    }
}
