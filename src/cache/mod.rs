//! Content-addressed reference cache.
//!
//! The cache owns a directory tree keyed by `(ecosystem, name, version)`:
//!
//! ```text
//! <root>/
//! ├── .staging/                 in-flight publishes
//! ├── .trash/                   replaced entries awaiting deletion
//! └── <ecosystem>/<name>/<version>/
//!     ├── content/              fetched reference content
//!     └── entry.json            entry record with the content hash
//! ```
//!
//! Content is always materialized in a private staging directory and
//! published with a single rename, so a reader either sees a complete entry
//! or no entry at all.

pub mod entry;
pub mod key;
mod lock;

pub use entry::CacheEntry;
pub use key::CacheKey;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::core::{Ecosystem, FetchError, SourceLocation};
use crate::sources::{ContentFetcher, SourceError};
use crate::util::fs::{is_dir_empty, list_subdirs, remove_dir_all_if_exists};
use crate::util::hash::sha256_dir;
use crate::util::CancellationToken;

use entry::{CONTENT_DIR, ENTRY_FILE};
use lock::{acquire, KeyLocks};

const STAGING_DIR: &str = ".staging";
const TRASH_DIR: &str = ".trash";

/// Staging directories older than this belong to a crashed process.
const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Error raised by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("`{0}` is not cached")]
    NotFound(CacheKey),

    #[error("`{key}` is corrupted: expected {expected}, found {actual}")]
    Corrupted {
        key: CacheKey,
        expected: String,
        actual: String,
    },

    #[error("fetching `{key}` produced no content")]
    EmptyContent { key: CacheKey },

    #[error("failed to fetch `{key}`: {source}")]
    Fetch { key: CacheKey, source: SourceError },

    #[error("cancelled while publishing `{0}`")]
    Cancelled(CacheKey),

    #[error("cache I/O error for `{key}`: {message}")]
    Io { key: CacheKey, message: String },
}

impl CacheError {
    fn io(key: &CacheKey, err: impl std::fmt::Display) -> Self {
        CacheError::Io {
            key: key.clone(),
            message: format!("{:#}", err),
        }
    }

    /// Translate into the fetch error taxonomy.
    pub fn into_fetch_error(self, package: &str) -> FetchError {
        match self {
            CacheError::Corrupted {
                key,
                expected,
                actual,
            } => FetchError::CacheCorruption {
                key: key.to_string(),
                expected,
                actual,
            },
            CacheError::EmptyContent { key } => FetchError::FetchFailed {
                package: package.to_string(),
                version: key.version().to_string(),
                message: "the fetched source was empty".into(),
                retryable: false,
            },
            CacheError::Fetch { key, source } => FetchError::FetchFailed {
                package: package.to_string(),
                version: key.version().to_string(),
                retryable: source.is_transport(),
                message: source.to_string(),
            },
            CacheError::Cancelled(_) => FetchError::Cancelled {
                package: package.to_string(),
            },
            CacheError::NotFound(key) => FetchError::Cache {
                key: key.to_string(),
                message: "entry is missing".into(),
            },
            CacheError::Io { key, message } => FetchError::Cache {
                key: key.to_string(),
                message,
            },
        }
    }
}

/// Options for `CacheStore::put`.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Replace an existing entry
    pub force: bool,
    pub cancel: CancellationToken,
}

/// Result of a successful `put`.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub entry: CacheEntry,
    /// False when an existing entry was returned without fetching
    pub fetched: bool,
}

/// Selects entries for `CacheStore::clean`.
#[derive(Debug, Clone, Default)]
pub struct CacheFilter {
    pub ecosystem: Option<Ecosystem>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl CacheFilter {
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        if self.ecosystem.is_some_and(|eco| entry.ecosystem != eco) {
            return false;
        }
        if let Some(name) = &self.name {
            if entry.name != entry.ecosystem.normalize_name(name) {
                return false;
            }
        }
        match &self.version {
            Some(version) => entry.version == *version,
            None => true,
        }
    }
}

/// The on-disk cache.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    locks: KeyLocks,
}

impl CacheStore {
    /// Open (and create if needed) a cache rooted at `root`.
    ///
    /// Staging directories abandoned by crashed processes and leftover trash
    /// are removed.
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let store = CacheStore {
            root: root.to_path_buf(),
            locks: KeyLocks::default(),
        };
        crate::util::fs::ensure_dir(&store.staging_dir())?;
        crate::util::fs::ensure_dir(&store.trash_dir())?;
        store.sweep(STALE_STAGING_AGE);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    /// Directory of an entry (holding `content/` and `entry.json`).
    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Whether a published entry exists. Never hashes content.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.entry_dir(key).join(ENTRY_FILE).is_file()
    }

    /// Content directory of a published entry.
    pub fn get(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        if self.has(key) {
            Ok(self.entry_dir(key).join(CONTENT_DIR))
        } else {
            Err(CacheError::NotFound(key.clone()))
        }
    }

    /// Read an entry's record.
    pub fn entry(&self, key: &CacheKey) -> Result<CacheEntry, CacheError> {
        if !self.has(key) {
            return Err(CacheError::NotFound(key.clone()));
        }
        CacheEntry::read(&self.entry_dir(key)).map_err(|e| CacheError::io(key, e))
    }

    /// Recompute the content hash and compare it with the record.
    pub fn verify(&self, key: &CacheKey) -> Result<CacheEntry, CacheError> {
        let entry = match self.entry(key) {
            Ok(entry) => entry,
            Err(CacheError::Io { message, .. }) => {
                return Err(CacheError::Corrupted {
                    key: key.clone(),
                    expected: "a readable entry record".into(),
                    actual: message,
                })
            }
            Err(e) => return Err(e),
        };

        let actual = if entry.local_path.is_dir() {
            sha256_dir(&entry.local_path).map_err(|e| CacheError::io(key, e))?
        } else {
            String::from("missing content")
        };

        if actual != entry.content_hash {
            return Err(CacheError::Corrupted {
                key: key.clone(),
                expected: entry.content_hash,
                actual,
            });
        }
        Ok(entry)
    }

    /// Fetch `location` into the cache under `key`.
    ///
    /// Holding the key's lock, an existing complete entry is returned as is
    /// unless `force` is set. Otherwise content is fetched into a fresh
    /// staging directory, hashed, recorded and published by rename. Any
    /// failure leaves the published cache untouched.
    pub fn put(
        &self,
        key: &CacheKey,
        location: &SourceLocation,
        fetcher: &dyn ContentFetcher,
        options: &PutOptions,
    ) -> Result<PutOutcome, CacheError> {
        let lock = self.locks.for_key(key);
        let _guard = acquire(&lock);

        if !options.force && self.has(key) {
            tracing::debug!("{} already cached", key);
            return Ok(PutOutcome {
                entry: self.entry(key)?,
                fetched: false,
            });
        }

        if options.cancel.is_cancelled() {
            return Err(CacheError::Cancelled(key.clone()));
        }

        // Removed on drop unless renamed into place
        let staging = tempfile::Builder::new()
            .prefix("put-")
            .tempdir_in(self.staging_dir())
            .map_err(|e| CacheError::io(key, e))?;
        let content = staging.path().join(CONTENT_DIR);
        fs::create_dir(&content).map_err(|e| CacheError::io(key, e))?;

        tracing::info!("Fetching {} from {}", key, location);
        fetcher
            .fetch(location, &content)
            .map_err(|source| CacheError::Fetch {
                key: key.clone(),
                source,
            })?;

        if is_dir_empty(&content).map_err(|e| CacheError::io(key, e))? {
            return Err(CacheError::EmptyContent { key: key.clone() });
        }

        let content_hash = sha256_dir(&content).map_err(|e| CacheError::io(key, e))?;
        let entry = CacheEntry::new(key, location.clone(), content_hash);
        entry
            .write(staging.path())
            .map_err(|e| CacheError::io(key, e))?;

        if options.cancel.is_cancelled() {
            return Err(CacheError::Cancelled(key.clone()));
        }

        let dest = self.entry_dir(key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(key, e))?;
        }

        if dest.exists() {
            if options.force {
                self.discard(&dest).map_err(|e| CacheError::io(key, e))?;
            } else {
                // Another process published while we were fetching
                tracing::debug!("{} was published concurrently", key);
                return Ok(PutOutcome {
                    entry: self.entry(key)?,
                    fetched: false,
                });
            }
        }

        match fs::rename(staging.path(), &dest) {
            Ok(()) => {}
            Err(_) if self.has(key) => {
                tracing::debug!("{} was published concurrently", key);
                return Ok(PutOutcome {
                    entry: self.entry(key)?,
                    fetched: false,
                });
            }
            Err(e) => return Err(CacheError::io(key, e)),
        }

        let mut entry = entry;
        entry.local_path = dest.join(CONTENT_DIR);
        Ok(PutOutcome {
            entry,
            fetched: true,
        })
    }

    /// Move a published entry aside and delete it.
    fn discard(&self, entry_dir: &Path) -> io::Result<()> {
        let trash = tempfile::Builder::new()
            .prefix("old-")
            .tempdir_in(self.trash_dir())?;
        let target = trash.path().join("entry");
        fs::rename(entry_dir, &target)?;
        // Dropping `trash` deletes the old entry
        Ok(())
    }

    /// Remove one entry. Returns whether anything was removed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let lock = self.locks.for_key(key);
        let _guard = acquire(&lock);

        let dir = self.entry_dir(key);
        if !dir.exists() {
            return Ok(false);
        }
        self.discard(&dir).map_err(|e| CacheError::io(key, e))?;
        self.prune_empty_parents(&dir);
        Ok(true)
    }

    /// Every published entry, sorted by ecosystem, name and version.
    pub fn list(&self) -> Vec<CacheEntry> {
        let mut entries = Vec::new();
        for eco in Ecosystem::ALL {
            for name_dir in list_subdirs(&self.root.join(eco.as_str())).unwrap_or_default() {
                for version_dir in list_subdirs(&name_dir).unwrap_or_default() {
                    if !version_dir.join(ENTRY_FILE).is_file() {
                        continue;
                    }
                    match CacheEntry::read(&version_dir) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => tracing::warn!(
                            "skipping unreadable cache entry {}: {:#}",
                            version_dir.display(),
                            e
                        ),
                    }
                }
            }
        }
        entries.sort_by(|a, b| {
            (a.ecosystem, &a.name, &a.version).cmp(&(b.ecosystem, &b.name, &b.version))
        });
        entries
    }

    /// Cached versions of one package.
    pub fn versions(&self, ecosystem: Ecosystem, name: &str) -> Vec<String> {
        let name = ecosystem.normalize_name(name);
        self.list()
            .into_iter()
            .filter(|e| e.ecosystem == ecosystem && e.name == name)
            .map(|e| e.version)
            .collect()
    }

    /// Remove every entry matching `filter`, leftover trash and stale
    /// staging. Returns the number of entries removed.
    ///
    /// Staging younger than an hour may belong to a running fetch and is
    /// left alone.
    pub fn clean(&self, filter: &CacheFilter) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in self.list().iter().filter(|e| filter.matches(e)) {
            if self.remove(&entry.key())? {
                removed += 1;
            }
        }
        self.sweep(STALE_STAGING_AGE);
        Ok(removed)
    }

    /// Delete trash and staging directories older than `age`.
    fn sweep(&self, age: Duration) {
        for dir in list_subdirs(&self.trash_dir()).unwrap_or_default() {
            if let Err(e) = remove_dir_all_if_exists(&dir) {
                tracing::warn!("{:#}", e);
            }
        }

        let now = SystemTime::now();
        for dir in list_subdirs(&self.staging_dir()).unwrap_or_default() {
            let stale = fs::metadata(&dir)
                .and_then(|m| m.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default() >= age)
                .unwrap_or(true);
            if stale {
                tracing::debug!("removing stale staging directory {}", dir.display());
                if let Err(e) = remove_dir_all_if_exists(&dir) {
                    tracing::warn!("{:#}", e);
                }
            }
        }
    }

    /// Remove now-empty `<name>` directories after an entry is removed.
    fn prune_empty_parents(&self, entry_dir: &Path) {
        if let Some(name_dir) = entry_dir.parent() {
            if name_dir.starts_with(&self.root) && is_dir_empty(name_dir).unwrap_or(false) {
                let _ = fs::remove_dir(name_dir);
            }
        }
    }
}
