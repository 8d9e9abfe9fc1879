//! Implementation of `ref-fetch cache`.

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::cache::{CacheEntry, CacheError, CacheFilter, CacheKey, CacheStore};

/// Entries matching `filter`, sorted by ecosystem, name and version.
pub fn list_entries(store: &CacheStore, filter: &CacheFilter) -> Vec<CacheEntry> {
    store.list().into_iter().filter(|e| filter.matches(e)).collect()
}

/// Disk usage of the matching entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub entries: usize,
    pub bytes: u64,
}

pub fn cache_usage(store: &CacheStore, filter: &CacheFilter) -> Result<CacheUsage> {
    let mut usage = CacheUsage::default();
    for entry in list_entries(store, filter) {
        let dir = store.entry_dir(&entry.key());
        for file in WalkDir::new(&dir) {
            let file = file.with_context(|| format!("failed to walk {}", dir.display()))?;
            if file.file_type().is_file() {
                usage.bytes += file
                    .metadata()
                    .with_context(|| format!("failed to stat {}", file.path().display()))?
                    .len();
            }
        }
        usage.entries += 1;
    }
    Ok(usage)
}

/// Result of re-hashing cached entries.
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub intact: Vec<CacheKey>,
    /// Corrupted entries and what was wrong with them
    pub corrupted: Vec<(CacheKey, String)>,
    /// Corrupted entries that were removed
    pub removed: usize,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.corrupted.is_empty()
    }
}

/// Re-hash every matching entry, removing corrupted ones when `repair` is set.
pub fn verify_entries(
    store: &CacheStore,
    filter: &CacheFilter,
    repair: bool,
) -> Result<VerifyReport, CacheError> {
    let mut report = VerifyReport::default();

    for entry in list_entries(store, filter) {
        let key = entry.key();
        match store.verify(&key) {
            Ok(_) => report.intact.push(key),
            Err(e @ CacheError::Corrupted { .. }) => {
                tracing::warn!("{}", e);
                if repair && store.remove(&key)? {
                    report.removed += 1;
                }
                report.corrupted.push((key, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PutOptions;
    use crate::core::{Ecosystem, GitReference, SourceLocation};
    use crate::test_support::FakeFetcher;
    use tempfile::TempDir;
    use url::Url;

    fn populated() -> (TempDir, CacheStore) {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let location = SourceLocation::git(
            Url::parse("https://github.com/psf/requests").unwrap(),
            GitReference::Tag("v2.31.0".into()),
        );
        let fetcher = FakeFetcher::new().with_files(&[("README.md", "0123456789")]);
        for (eco, name, version) in [
            (Ecosystem::Pip, "requests", "2.31.0"),
            (Ecosystem::Npm, "chalk", "5.3.0"),
        ] {
            store
                .put(
                    &CacheKey::new(eco, name, version),
                    &location,
                    &fetcher,
                    &PutOptions::default(),
                )
                .unwrap();
        }
        (tmp, store)
    }

    #[test]
    fn test_list_with_filter() {
        let (_tmp, store) = populated();
        let filter = CacheFilter {
            ecosystem: Some(Ecosystem::Npm),
            ..Default::default()
        };
        let entries = list_entries(&store, &filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "chalk");
    }

    #[test]
    fn test_usage_counts_content() {
        let (_tmp, store) = populated();
        let usage = cache_usage(&store, &CacheFilter::default()).unwrap();
        assert_eq!(usage.entries, 2);
        // Content plus the entry records
        assert!(usage.bytes > 20);
    }

    #[test]
    fn test_verify_and_repair() {
        let (_tmp, store) = populated();
        let key = CacheKey::new(Ecosystem::Pip, "requests", "2.31.0");
        std::fs::write(store.get(&key).unwrap().join("README.md"), "tampered").unwrap();

        let report = verify_entries(&store, &CacheFilter::default(), false).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.intact.len(), 1);
        assert_eq!(report.corrupted[0].0, key);
        assert!(store.has(&key));

        let report = verify_entries(&store, &CacheFilter::default(), true).unwrap();
        assert_eq!(report.removed, 1);
        assert!(!store.has(&key));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
